//! Column transform: `im2col` lowers window extraction to a dense tensor,
//! `col2im` is its accumulating adjoint.
//!
//! `im2col` produces a column tensor of shape `(b, c, k_1..k_n, out_1..out_n)`
//! where every window of the input appears as one slot per kernel position.
//! Pooling then reduces over the kernel axes; gradients flow back through
//! `col2im`, which adds overlapping window contributions instead of copying.

use rayon::prelude::*;
use tessera_core::{with_element, Element, Result, Tensor, TesseraError};

use crate::window::Window;

const PAR_THRESHOLD: usize = 8192;

/// Fill for the padded margin the column transform introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadValue {
    /// Zero fill, for sum/average reductions.
    Zero,
    /// The dtype's lowest value, so padding never wins a max reduction.
    Lowest,
}

/// Permutation exchanging the kernel-axis block and the output-axis block of
/// a column tensor: `(b, c, k_1..k_n, out_1..out_n)` to
/// `(b, c, out_1..out_n, k_1..k_n)`.
///
/// Self-inverse, so the same permutation converts in either direction.
pub fn swap_spatial_axes(n: usize) -> Vec<usize> {
    let mut p = vec![0usize; 2 + 2 * n];
    p[1] = 1;
    for i in 0..n {
        p[2 + i] = 2 + n + i;
        p[2 + n + i] = 2 + i;
    }
    p
}

/// Lower an `(b, c, d_1..d_n)` tensor to its column form.
///
/// Each spatial extent is padded to `d + 2*pad`, plus `stride - 1` under
/// cover-all so the trailing partial window stays in bounds. The input is
/// copied in at offset `pad`; everything else holds `fill`.
pub fn im2col(x: &Tensor, window: &Window, cover_all: bool, fill: PadValue) -> Result<Tensor> {
    let n = window.ndim();
    if x.ndim() != 2 + n {
        return Err(TesseraError::ShapeMismatch {
            expected: vec![0; 2 + n],
            got: x.shape().dims().to_vec(),
        });
    }
    with_element!(x.dtype(), T, { im2col_t::<T>(x, window, cover_all, fill) })
}

/// Accumulate a column tensor back to shape `(b, c, d_1..d_n)`.
///
/// The adjoint of [`im2col`]: input positions covered by several windows
/// receive the sum of their column slots. Contributions that land in the
/// padded margin are discarded.
pub fn col2im(col: &Tensor, window: &Window, spatial: &[usize]) -> Result<Tensor> {
    let n = window.ndim();
    if col.ndim() != 2 + 2 * n {
        return Err(TesseraError::ShapeMismatch {
            expected: vec![0; 2 + 2 * n],
            got: col.shape().dims().to_vec(),
        });
    }
    if spatial.len() != n {
        return Err(TesseraError::ShapeMismatch {
            expected: vec![n],
            got: vec![spatial.len()],
        });
    }
    let kernel_dims = &col.shape().dims()[2..2 + n];
    if kernel_dims != window.kernel() {
        return Err(TesseraError::ShapeMismatch {
            expected: window.kernel().to_vec(),
            got: kernel_dims.to_vec(),
        });
    }
    with_element!(col.dtype(), T, { col2im_t::<T>(col, window, spatial) })
}

fn im2col_t<T: Element>(
    x: &Tensor,
    window: &Window,
    cover_all: bool,
    fill: PadValue,
) -> Result<Tensor> {
    let data = x.contiguous();
    let dims = data.shape().dims().to_vec();
    let n = window.ndim();
    let batch = dims[0];
    let channels = dims[1];
    let spatial = &dims[2..];
    let out_dims = window.out_dims(spatial, cover_all)?;

    let fill = match fill {
        PadValue::Zero => T::zero(),
        PadValue::Lowest => T::lowest(),
    };

    let padded_dims: Vec<usize> = (0..n)
        .map(|i| {
            spatial[i]
                + 2 * window.pad()[i]
                + if cover_all { window.stride()[i] - 1 } else { 0 }
        })
        .collect();
    let pstrides = dim_strides(&padded_dims);

    let bc = batch * channels;
    let spatial_total: usize = spatial.iter().product();
    let padded_total: usize = padded_dims.iter().product();
    let out_total: usize = out_dims.iter().product();
    let kernel_total = window.kernel_total();

    // Stage the input into the padded planes, one contiguous row at a time
    let x_data = data.as_slice::<T>().unwrap();
    let mut padded = vec![fill; bc * padded_total];
    let row_len = spatial[n - 1];
    let rows_per_plane: usize = spatial[..n - 1].iter().product();
    for plane in 0..bc {
        let src = &x_data[plane * spatial_total..][..spatial_total];
        let dst = &mut padded[plane * padded_total..][..padded_total];
        for row in 0..rows_per_plane {
            let mut remaining = row;
            let mut offset = window.pad()[n - 1];
            for j in (0..n - 1).rev() {
                offset += (remaining % spatial[j] + window.pad()[j]) * pstrides[j];
                remaining /= spatial[j];
            }
            dst[offset..offset + row_len].copy_from_slice(&src[row * row_len..][..row_len]);
        }
    }

    // Offsets of each kernel slot and each window origin within a plane
    let ones = vec![1usize; n];
    let k_offsets = walk_offsets(window.kernel(), &pstrides, &ones);
    let o_offsets = walk_offsets(&out_dims, &pstrides, window.stride());

    let mut col = vec![fill; bc * kernel_total * out_total];
    let plane_len = kernel_total * out_total;

    let gather = |plane_col: &mut [T], plane_padded: &[T]| {
        for (kf, &ko) in k_offsets.iter().enumerate() {
            let dst = &mut plane_col[kf * out_total..][..out_total];
            for (of, &oo) in o_offsets.iter().enumerate() {
                dst[of] = plane_padded[ko + oo];
            }
        }
    };

    if bc * plane_len >= PAR_THRESHOLD {
        col.par_chunks_mut(plane_len)
            .zip(padded.par_chunks(padded_total))
            .for_each(|(pc, pp)| gather(pc, pp));
    } else {
        col.chunks_mut(plane_len)
            .zip(padded.chunks(padded_total))
            .for_each(|(pc, pp)| gather(pc, pp));
    }

    let mut col_dims = vec![batch, channels];
    col_dims.extend_from_slice(window.kernel());
    col_dims.extend_from_slice(&out_dims);
    Ok(Tensor::from_elems(&col, &col_dims))
}

fn col2im_t<T: Element>(col: &Tensor, window: &Window, spatial: &[usize]) -> Result<Tensor> {
    let data = col.contiguous();
    let dims = data.shape().dims().to_vec();
    let n = window.ndim();
    let batch = dims[0];
    let channels = dims[1];
    let out_dims = &dims[2 + n..];

    let mut full_dims = vec![batch, channels];
    full_dims.extend_from_slice(spatial);

    let bc = batch * channels;
    let spatial_total: usize = spatial.iter().product();
    let out_total: usize = out_dims.iter().product();
    let kernel_total = window.kernel_total();

    if out_total == 0 {
        let out = vec![T::zero(); bc * spatial_total];
        return Ok(Tensor::from_elems(&out, &full_dims));
    }

    // Margin covers the cover-all case unconditionally; a forward pass
    // without cover-all simply never touches the extra slots
    let margin_dims: Vec<usize> = (0..n)
        .map(|i| spatial[i] + 2 * window.pad()[i] + window.stride()[i] - 1)
        .collect();
    for i in 0..n {
        let reach = window.kernel()[i] - 1 + window.stride()[i] * (out_dims[i] - 1);
        if reach >= margin_dims[i] {
            return Err(TesseraError::StorageError(format!(
                "col2im: output extent {} overruns spatial axis {} of extent {}",
                out_dims[i], i, spatial[i]
            )));
        }
    }
    let mstrides = dim_strides(&margin_dims);
    let margin_total: usize = margin_dims.iter().product();

    let ones = vec![1usize; n];
    let k_offsets = walk_offsets(window.kernel(), &mstrides, &ones);
    let o_offsets = walk_offsets(out_dims, &mstrides, window.stride());

    let col_data = data.as_slice::<T>().unwrap();
    let mut padded = vec![T::zero(); bc * margin_total];
    let plane_len = kernel_total * out_total;

    let accumulate = |plane_padded: &mut [T], plane_col: &[T]| {
        for (kf, &ko) in k_offsets.iter().enumerate() {
            let src = &plane_col[kf * out_total..][..out_total];
            for (of, &oo) in o_offsets.iter().enumerate() {
                let slot = &mut plane_padded[ko + oo];
                *slot = *slot + src[of];
            }
        }
    };

    if bc * plane_len >= PAR_THRESHOLD {
        padded
            .par_chunks_mut(margin_total)
            .zip(col_data.par_chunks(plane_len))
            .for_each(|(pp, pc)| accumulate(pp, pc));
    } else {
        padded
            .chunks_mut(margin_total)
            .zip(col_data.chunks(plane_len))
            .for_each(|(pp, pc)| accumulate(pp, pc));
    }

    // Slice the interior [pad, pad + d) back out, row by row
    let mut out = vec![T::zero(); bc * spatial_total];
    let row_len = spatial[n - 1];
    let rows_per_plane: usize = spatial[..n - 1].iter().product();
    for plane in 0..bc {
        let src = &padded[plane * margin_total..][..margin_total];
        let dst = &mut out[plane * spatial_total..][..spatial_total];
        for row in 0..rows_per_plane {
            let mut remaining = row;
            let mut offset = window.pad()[n - 1];
            for j in (0..n - 1).rev() {
                offset += (remaining % spatial[j] + window.pad()[j]) * mstrides[j];
                remaining /= spatial[j];
            }
            dst[row * row_len..][..row_len].copy_from_slice(&src[offset..offset + row_len]);
        }
    }

    Ok(Tensor::from_elems(&out, &full_dims))
}

/// Row-major strides for a dimension list.
fn dim_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Flat plane offsets of a row-major walk over `dims`, where advancing axis
/// `j` by one moves `strides[j] * scale[j]` elements.
fn walk_offsets(dims: &[usize], strides: &[usize], scale: &[usize]) -> Vec<usize> {
    let total: usize = dims.iter().product();
    let mut offsets = vec![0usize; total];
    for (f, slot) in offsets.iter_mut().enumerate() {
        let mut remaining = f;
        let mut offset = 0usize;
        for j in (0..dims.len()).rev() {
            offset += (remaining % dims[j]) * strides[j] * scale[j];
            remaining /= dims[j];
        }
        *slot = offset;
    }
    offsets
}
