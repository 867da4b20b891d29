//! Pooling operators — N-dimensional max and average pooling.
//!
//! Both operate on tensors of shape `[batch, channels, d_1, ..., d_n]` for
//! any spatial rank `n`, by lowering windows to a column tensor and reducing
//! over the kernel axes. Max pooling is stateful: forward retains the column
//! tensor, backward retains the argmax routing, and double-backward replays
//! that routing on the incoming tangent.

use tessera_core::{DType, Result, Tensor, TesseraError};

use crate::col::{col2im, im2col, swap_spatial_axes, PadValue};
use crate::window::Window;

/// How average pooling treats window slots clipped off by the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Clipped slots count as zeros: every window divides by the nominal
    /// kernel size.
    Zero,
    /// Clipped slots are ignored: every window divides by the number of
    /// input elements it actually overlaps.
    Ignore,
}

/// N-dimensional max pooling operator.
///
/// Input shape: `[batch, channels, d_1, ..., d_n]`
/// Output shape: `[batch, channels, out_1, ..., out_n]`
/// where `out_i = (d_i + 2*pad_i - kernel_i) / stride_i + 1` (cover-all
/// rounds up instead, adding a trailing partial window per axis).
///
/// The stages form a sequence: `forward` must precede `backward`, which must
/// precede `double_backward`. Calling a stage before its prerequisite
/// reports `InvalidState`. A fresh `forward` restarts the sequence.
pub struct MaxPool {
    window: Window,
    cover_all: bool,
    x: Option<Tensor>,
    col: Option<Tensor>,
    indices: Option<Tensor>,
    offset: Option<Tensor>,
}

impl MaxPool {
    /// Create a max pooling operator. `kernel`, `stride`, and `pad` hold one
    /// entry per spatial axis.
    pub fn new(kernel: &[usize], stride: &[usize], pad: &[usize], cover_all: bool) -> Result<Self> {
        Ok(Self {
            window: Window::new(kernel, stride, pad)?,
            cover_all,
            x: None,
            col: None,
            indices: None,
            offset: None,
        })
    }

    /// Number of spatial axes this operator pools over.
    pub fn ndim(&self) -> usize {
        self.window.ndim()
    }

    /// Pool the input, retaining what backward needs.
    pub fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let n = self.window.ndim();
        if x.ndim() != 2 + n {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![0; 2 + n],
                got: x.shape().dims().to_vec(),
            });
        }

        let col = im2col(x, &self.window, self.cover_all, PadValue::Lowest)?;
        let axes: Vec<usize> = (2..2 + n).collect();
        let out = col.max_axes(&axes)?;

        self.x = Some(x.clone());
        self.col = Some(col);
        // Restarting the sequence invalidates routing from a previous pass
        self.indices = None;
        self.offset = None;
        Ok(out)
    }

    /// Route the upstream gradient back to the input positions that won the
    /// max, accumulating where windows overlap.
    ///
    /// `gout` must match the forward output in shape and dtype. Ties within
    /// a window resolve to the first slot in row-major kernel order; the
    /// routing is retained so `double_backward` follows the same choice.
    pub fn backward(&mut self, gout: &Tensor) -> Result<Tensor> {
        let col = self.col.as_ref().ok_or(TesseraError::InvalidState(
            "max_pool backward requires a prior forward",
        ))?;
        let x = self.x.as_ref().ok_or(TesseraError::InvalidState(
            "max_pool backward requires a prior forward",
        ))?;

        let n = self.window.ndim();
        let col_dims = col.shape().dims();
        let mut expected = vec![col_dims[0], col_dims[1]];
        expected.extend_from_slice(&col_dims[2 + n..]);
        if gout.shape().dims() != expected.as_slice() {
            return Err(TesseraError::ShapeMismatch {
                expected,
                got: gout.shape().dims().to_vec(),
            });
        }
        if gout.dtype() != col.dtype() {
            return Err(TesseraError::DTypeMismatch {
                expected: col.dtype(),
                got: gout.dtype(),
            });
        }

        let axes: Vec<usize> = (2..2 + n).collect();
        let indices = col.argmax_axes(&axes)?;

        // One block of kernel_total slots per output position; the argmax
        // index addresses the winning slot within its block
        let kernel_total = self.window.kernel_total();
        let positions = indices.numel();
        let offsets: Vec<i64> = (0..positions as i64)
            .map(|i| i * kernel_total as i64)
            .collect();
        let offset = Tensor::from_i64(&offsets, &[positions]);

        let addr = indices.reshape(&[-1])?.add(&offset)?;
        let gout_flat = gout.contiguous().reshape(&[-1])?;
        let gcol_flat =
            Tensor::zeros(&[positions * kernel_total], gout.dtype()).index_add(&addr, &gout_flat)?;

        // (b, c, out..., k...) then swap into column layout for the adjoint
        let mut block_dims: Vec<isize> = expected.iter().map(|&d| d as isize).collect();
        block_dims.extend(self.window.kernel().iter().map(|&d| d as isize));
        let gcol = gcol_flat
            .reshape(&block_dims)?
            .permute(&swap_spatial_axes(n))?
            .contiguous();

        let spatial = &x.shape().dims()[2..];
        let gx = col2im(&gcol, &self.window, spatial)?;

        self.indices = Some(indices);
        self.offset = Some(offset);
        Ok(gx)
    }

    /// Second-order pass: gather the input-shaped tangent `ggx` at the same
    /// positions backward routed through.
    pub fn double_backward(&mut self, ggx: &Tensor) -> Result<Tensor> {
        let indices = self.indices.as_ref().ok_or(TesseraError::InvalidState(
            "max_pool double_backward requires a prior backward",
        ))?;
        let offset = self.offset.as_ref().ok_or(TesseraError::InvalidState(
            "max_pool double_backward requires a prior backward",
        ))?;
        let x = self.x.as_ref().ok_or(TesseraError::InvalidState(
            "max_pool double_backward requires a prior forward",
        ))?;

        if ggx.shape().dims() != x.shape().dims() {
            return Err(TesseraError::ShapeMismatch {
                expected: x.shape().dims().to_vec(),
                got: ggx.shape().dims().to_vec(),
            });
        }

        let n = self.window.ndim();
        let col = im2col(ggx, &self.window, self.cover_all, PadValue::Lowest)?;
        let flat = col
            .permute(&swap_spatial_axes(n))?
            .contiguous()
            .reshape(&[-1])?;

        let idx_dims: Vec<isize> = indices.shape().dims().iter().map(|&d| d as isize).collect();
        let addr = indices.add(&offset.reshape(&idx_dims)?)?;
        flat.take(&addr)
    }
}

/// N-dimensional average pooling operator.
///
/// Input shape: `[batch, channels, d_1, ..., d_n]`
/// Output shape: `[batch, channels, out_1, ..., out_n]`
/// where `out_i = (d_i + 2*pad_i - kernel_i) / stride_i + 1`.
///
/// Floating-point inputs only. Stateless; `backward` is a documented gap.
pub struct AvgPool {
    window: Window,
    pad_mode: PadMode,
}

impl AvgPool {
    /// Create an average pooling operator. `kernel`, `stride`, and `pad`
    /// hold one entry per spatial axis.
    pub fn new(kernel: &[usize], stride: &[usize], pad: &[usize], pad_mode: PadMode) -> Result<Self> {
        Ok(Self {
            window: Window::new(kernel, stride, pad)?,
            pad_mode,
        })
    }

    /// Number of spatial axes this operator pools over.
    pub fn ndim(&self) -> usize {
        self.window.ndim()
    }

    /// Average the input windows per the configured [`PadMode`].
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let n = self.window.ndim();
        if x.ndim() != 2 + n {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![0; 2 + n],
                got: x.shape().dims().to_vec(),
            });
        }
        if !matches!(x.dtype(), DType::F32 | DType::F64) {
            return Err(TesseraError::UnsupportedDType(x.dtype()));
        }

        let col = im2col(x, &self.window, false, PadValue::Zero)?;
        let axes: Vec<usize> = (2..2 + n).collect();
        match self.pad_mode {
            PadMode::Zero => col.mean_axes(&axes),
            PadMode::Ignore => {
                let sums = col.sum_axes(&axes)?;
                let out_dims = &sums.shape().dims()[2..];
                let widths =
                    overlap_widths(&x.shape().dims()[2..], &self.window, out_dims, x.dtype())?;
                sums.div(&widths)
            }
        }
    }

    /// Gradient of average pooling. Not provided by this operator.
    pub fn backward(&self, _gout: &Tensor) -> Result<Tensor> {
        Err(TesseraError::NotImplemented("average pooling backward"))
    }
}

/// Per-output-position overlap between a window and the unpadded input,
/// composed across axes by outer product. Shape: `[out_1, ..., out_n]`.
///
/// A window living entirely in the padding has overlap zero; dividing by it
/// yields infinity, matching the underlying float semantics.
fn overlap_widths(
    spatial: &[usize],
    window: &Window,
    out_dims: &[usize],
    dtype: DType,
) -> Result<Tensor> {
    let axis_widths = |i: usize| -> Tensor {
        let k = window.kernel()[i] as isize;
        let s = window.stride()[i] as isize;
        let p = window.pad()[i] as isize;
        let d = spatial[i] as isize;
        let widths: Vec<f64> = (0..out_dims[i] as isize)
            .map(|j| {
                let lo = j * s - p;
                let start = lo.max(0);
                let end = (lo + k).min(d);
                (end - start).max(0) as f64
            })
            .collect();
        if dtype == DType::F32 {
            let w32: Vec<f32> = widths.iter().map(|&v| v as f32).collect();
            Tensor::from_f32(&w32, &[w32.len()])
        } else {
            Tensor::from_f64(&widths, &[widths.len()])
        }
    };

    let mut grid = axis_widths(0);
    for i in 1..window.ndim() {
        grid = grid.outer(&axis_widths(i))?;
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pool_forward_shape() {
        let mut pool = MaxPool::new(&[2, 2], &[2, 2], &[0, 0], false).unwrap();
        let x = Tensor::randn(&[2, 3, 4, 4]);
        let out = pool.forward(&x).unwrap();
        assert_eq!(out.shape().dims(), &[2, 3, 2, 2]);
    }

    #[test]
    fn test_max_pool_rank_mismatch() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let x = Tensor::randn(&[2, 3, 4, 4]);
        assert!(matches!(
            pool.forward(&x),
            Err(TesseraError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_max_pool_backward_before_forward() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let gout = Tensor::from_f32(&[1.0], &[1, 1, 1]);
        assert!(matches!(
            pool.backward(&gout),
            Err(TesseraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_max_pool_double_backward_before_backward() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]);
        pool.forward(&x).unwrap();
        assert!(matches!(
            pool.double_backward(&x),
            Err(TesseraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_max_pool_refresh_invalidates_routing() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]);
        let out = pool.forward(&x).unwrap();
        let gout = Tensor::zeros(out.shape().dims(), out.dtype());
        pool.backward(&gout).unwrap();

        // A second forward restarts the sequence
        pool.forward(&x).unwrap();
        assert!(matches!(
            pool.double_backward(&x),
            Err(TesseraError::InvalidState(_))
        ));
    }

    #[test]
    fn test_max_pool_gradient_shape_check() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]);
        pool.forward(&x).unwrap();
        let wrong = Tensor::from_f32(&[1.0, 1.0, 1.0], &[1, 1, 3]);
        assert!(matches!(
            pool.backward(&wrong),
            Err(TesseraError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_max_pool_gradient_dtype_check() {
        let mut pool = MaxPool::new(&[2], &[2], &[0], false).unwrap();
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 4]);
        pool.forward(&x).unwrap();
        let wrong = Tensor::from_f64(&[1.0, 1.0], &[1, 1, 2]);
        assert!(matches!(
            pool.backward(&wrong),
            Err(TesseraError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_avg_pool_integer_rejected() {
        let pool = AvgPool::new(&[2], &[2], &[0], PadMode::Zero).unwrap();
        let x = Tensor::from_i32(&[1, 2, 3, 4], &[1, 1, 4]);
        assert!(matches!(
            pool.forward(&x),
            Err(TesseraError::UnsupportedDType(DType::I32))
        ));
    }

    #[test]
    fn test_avg_pool_backward_unsupported() {
        let pool = AvgPool::new(&[2], &[2], &[0], PadMode::Zero).unwrap();
        let gout = Tensor::from_f32(&[1.0], &[1, 1, 1]);
        assert!(matches!(
            pool.backward(&gout),
            Err(TesseraError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_overlap_widths_interior_and_boundary() {
        let w = Window::new(&[2], &[2], &[1]).unwrap();
        let widths = overlap_widths(&[4], &w, &[3], DType::F32).unwrap();
        assert_eq!(widths.as_f32_slice().unwrap(), &[1.0, 2.0, 1.0]);
    }
}
