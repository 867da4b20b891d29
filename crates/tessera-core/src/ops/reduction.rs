//! Reduction operations: sum, mean, max, argmax.
//!
//! Axis reductions accept a set of axes and reduce them jointly. The element
//! order within a reduction block is row-major over the reduced axes, and
//! `argmax_axes` reports positions in that order, so an index produced here
//! addresses the same slot when the block is later laid out flat.

use rayon::prelude::*;

use crate::dtype::Element;
use crate::error::TesseraError;
use crate::tensor::Tensor;
use crate::{with_element, Result};

const PAR_THRESHOLD: usize = 8192;

impl Tensor {
    /// Sum all elements, returning a scalar tensor of the same dtype.
    pub fn sum(&self) -> Result<Tensor> {
        with_element!(self.dtype(), T, { sum_all_t::<T>(self) })
    }

    /// Sum over the given axes, removing them from the shape.
    pub fn sum_axes(&self, axes: &[usize]) -> Result<Tensor> {
        with_element!(self.dtype(), T, { sum_axes_t::<T>(self, axes) })
    }

    /// Mean over the given axes, removing them from the shape.
    ///
    /// Integer tensors divide with truncation.
    pub fn mean_axes(&self, axes: &[usize]) -> Result<Tensor> {
        let count: usize = {
            let dims = self.shape().dims();
            let mut product = 1usize;
            for &a in axes {
                let d = dims.get(a).copied().ok_or(TesseraError::InvalidAxis {
                    axis: a,
                    ndim: self.ndim(),
                })?;
                product *= d;
            }
            product
        };
        let s = self.sum_axes(axes)?;
        s.div_scalar(count as f64)
    }

    /// Maximum over the given axes, removing them from the shape.
    pub fn max_axes(&self, axes: &[usize]) -> Result<Tensor> {
        with_element!(self.dtype(), T, { max_axes_t::<T>(self, axes) })
    }

    /// Index of the maximum over the given axes, as an `i64` tensor.
    ///
    /// Each reported index is a flat position within the reduction block
    /// (row-major over the reduced axes). Ties resolve to the first
    /// occurrence in block order.
    pub fn argmax_axes(&self, axes: &[usize]) -> Result<Tensor> {
        with_element!(self.dtype(), T, { argmax_axes_t::<T>(self, axes) })
    }
}

/// Precomputed addressing for a multi-axis reduction over a contiguous tensor.
///
/// Every output position `o` reads the input at `base_offset(o) + r` for each
/// `r` in `red_offsets`.
struct ReducePlan {
    out_dims: Vec<usize>,
    out_strides: Vec<usize>,
    kept_strides: Vec<usize>,
    red_offsets: Vec<usize>,
}

impl ReducePlan {
    fn new(dims: &[usize], axes: &[usize]) -> Result<ReducePlan> {
        let ndim = dims.len();
        if axes.is_empty() {
            return Err(TesseraError::StorageError(
                "reduce: empty axis list".into(),
            ));
        }
        let mut reduced = vec![false; ndim];
        for &a in axes {
            if a >= ndim {
                return Err(TesseraError::InvalidAxis { axis: a, ndim });
            }
            if reduced[a] {
                return Err(TesseraError::StorageError(format!(
                    "reduce: duplicate axis {a}"
                )));
            }
            reduced[a] = true;
        }

        let mut in_strides = vec![1usize; ndim];
        for i in (0..ndim.saturating_sub(1)).rev() {
            in_strides[i] = in_strides[i + 1] * dims[i + 1];
        }

        let mut out_dims = Vec::with_capacity(ndim - axes.len());
        let mut kept_strides = Vec::with_capacity(ndim - axes.len());
        let mut red_dims = Vec::with_capacity(axes.len());
        let mut red_strides = Vec::with_capacity(axes.len());
        for i in 0..ndim {
            if reduced[i] {
                red_dims.push(dims[i]);
                red_strides.push(in_strides[i]);
            } else {
                out_dims.push(dims[i]);
                kept_strides.push(in_strides[i]);
            }
        }

        let red_numel: usize = red_dims.iter().product();
        if red_numel == 0 {
            return Err(TesseraError::StorageError(
                "reduce: reduction block is empty".into(),
            ));
        }

        // Offset of each block slot, in row-major order over the reduced axes
        let mut red_offsets = vec![0usize; red_numel];
        for (r, slot) in red_offsets.iter_mut().enumerate() {
            let mut remaining = r;
            let mut offset = 0usize;
            for j in (0..red_dims.len()).rev() {
                offset += (remaining % red_dims[j]) * red_strides[j];
                remaining /= red_dims[j];
            }
            *slot = offset;
        }

        let mut out_strides = vec![1usize; out_dims.len()];
        for i in (0..out_dims.len().saturating_sub(1)).rev() {
            out_strides[i] = out_strides[i + 1] * out_dims[i + 1];
        }

        Ok(ReducePlan {
            out_dims,
            out_strides,
            kept_strides,
            red_offsets,
        })
    }

    fn out_numel(&self) -> usize {
        self.out_dims.iter().product()
    }

    fn base_offset(&self, flat: usize) -> usize {
        let mut remaining = flat;
        let mut base = 0usize;
        for (os, ks) in self.out_strides.iter().zip(&self.kept_strides) {
            base += (remaining / os) * ks;
            remaining %= os;
        }
        base
    }
}

fn sum_all_t<T: Element>(t: &Tensor) -> Result<Tensor> {
    let data = t.contiguous();
    let slice = data.as_slice::<T>().unwrap();
    let total: T = if slice.len() >= PAR_THRESHOLD {
        slice
            .par_iter()
            .copied()
            .reduce(|| T::zero(), |a, b| a + b)
    } else {
        slice.iter().copied().fold(T::zero(), |a, b| a + b)
    };
    Ok(Tensor::from_elems(&[total], &[]))
}

fn sum_axes_t<T: Element>(t: &Tensor, axes: &[usize]) -> Result<Tensor> {
    let data = t.contiguous();
    let slice = data.as_slice::<T>().unwrap();
    let plan = ReducePlan::new(data.shape().dims(), axes)?;
    let out_numel = plan.out_numel();

    let compute = |o: usize| {
        let base = plan.base_offset(o);
        let mut acc = T::zero();
        for &r in &plan.red_offsets {
            acc = acc + slice[base + r];
        }
        acc
    };

    let result: Vec<T> = if out_numel * plan.red_offsets.len() >= PAR_THRESHOLD {
        (0..out_numel).into_par_iter().map(compute).collect()
    } else {
        (0..out_numel).map(compute).collect()
    };

    Ok(Tensor::from_elems(&result, &plan.out_dims))
}

fn max_axes_t<T: Element>(t: &Tensor, axes: &[usize]) -> Result<Tensor> {
    let data = t.contiguous();
    let slice = data.as_slice::<T>().unwrap();
    let plan = ReducePlan::new(data.shape().dims(), axes)?;
    let out_numel = plan.out_numel();

    let compute = |o: usize| {
        let base = plan.base_offset(o);
        let mut best = slice[base + plan.red_offsets[0]];
        for &r in &plan.red_offsets[1..] {
            let v = slice[base + r];
            if v > best {
                best = v;
            }
        }
        best
    };

    let result: Vec<T> = if out_numel * plan.red_offsets.len() >= PAR_THRESHOLD {
        (0..out_numel).into_par_iter().map(compute).collect()
    } else {
        (0..out_numel).map(compute).collect()
    };

    Ok(Tensor::from_elems(&result, &plan.out_dims))
}

fn argmax_axes_t<T: Element>(t: &Tensor, axes: &[usize]) -> Result<Tensor> {
    let data = t.contiguous();
    let slice = data.as_slice::<T>().unwrap();
    let plan = ReducePlan::new(data.shape().dims(), axes)?;
    let out_numel = plan.out_numel();

    let compute = |o: usize| {
        let base = plan.base_offset(o);
        let mut best = slice[base + plan.red_offsets[0]];
        let mut best_r = 0usize;
        // Strict comparison keeps the first occurrence on ties
        for (r, &off) in plan.red_offsets.iter().enumerate().skip(1) {
            let v = slice[base + off];
            if v > best {
                best = v;
                best_r = r;
            }
        }
        best_r as i64
    };

    let result: Vec<i64> = if out_numel * plan.red_offsets.len() >= PAR_THRESHOLD {
        (0..out_numel).into_par_iter().map(compute).collect()
    } else {
        (0..out_numel).map(compute).collect()
    };

    Ok(Tensor::from_elems(&result, &plan.out_dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_sum_all() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let s = t.sum().unwrap();
        assert!(s.shape().is_scalar());
        assert_eq!(s.get_f32(0), Some(10.0));

        let t = Tensor::from_i64(&[1, 2, 3], &[3]);
        assert_eq!(t.sum().unwrap().get::<i64>(0), Some(6));
    }

    #[test]
    fn test_sum_axes_single() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let s = t.sum_axes(&[1]).unwrap();
        assert_eq!(s.shape().dims(), &[2]);
        assert_eq!(s.as_f32_slice().unwrap(), &[6.0, 15.0]);

        let s = t.sum_axes(&[0]).unwrap();
        assert_eq!(s.as_f32_slice().unwrap(), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_sum_axes_joint() {
        let t = Tensor::from_f32(&(1..=8).map(|v| v as f32).collect::<Vec<_>>(), &[2, 2, 2]);
        let s = t.sum_axes(&[0, 2]).unwrap();
        assert_eq!(s.shape().dims(), &[2]);
        // axis 1 kept: [1+2+5+6, 3+4+7+8]
        assert_eq!(s.as_f32_slice().unwrap(), &[14.0, 22.0]);
    }

    #[test]
    fn test_mean_axes() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let m = t.mean_axes(&[1]).unwrap();
        assert_eq!(m.as_f32_slice().unwrap(), &[1.5, 3.5]);
    }

    #[test]
    fn test_max_axes_middle() {
        // Column layout (b, c, k, out): reduce the middle kernel axis
        let t = Tensor::from_f32(&[1.0, 5.0, 2.0, 4.0, 3.0, 6.0], &[1, 1, 2, 3]);
        let m = t.max_axes(&[2]).unwrap();
        assert_eq!(m.shape().dims(), &[1, 1, 3]);
        assert_eq!(m.as_f32_slice().unwrap(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_argmax_block_order() {
        let t = Tensor::from_f32(&[1.0, 5.0, 2.0, 4.0, 3.0, 6.0], &[1, 1, 2, 3]);
        let idx = t.argmax_axes(&[2]).unwrap();
        assert_eq!(idx.dtype(), DType::I64);
        assert_eq!(idx.shape().dims(), &[1, 1, 3]);
        // Per out column: max(1,4)=4@1, max(5,3)=5@0, max(2,6)=6@1
        assert_eq!(idx.as_slice::<i64>().unwrap(), &[1, 0, 1]);
    }

    #[test]
    fn test_argmax_joint_axes_row_major() {
        // Reducing two axes jointly reports row-major block positions
        let t = Tensor::from_f32(&[0.0, 1.0, 2.0, 9.0, 3.0, 4.0, 8.0, 5.0], &[2, 2, 2]);
        let idx = t.argmax_axes(&[1, 2]).unwrap();
        assert_eq!(idx.shape().dims(), &[2]);
        assert_eq!(idx.as_slice::<i64>().unwrap(), &[3, 2]);
    }

    #[test]
    fn test_argmax_tie_first_occurrence() {
        let t = Tensor::from_f32(&[7.0, 7.0, 7.0, 7.0], &[1, 4]);
        let idx = t.argmax_axes(&[1]).unwrap();
        assert_eq!(idx.as_slice::<i64>().unwrap(), &[0]);
    }

    #[test]
    fn test_max_axes_i32() {
        let t = Tensor::from_i32(&[-5, -2, -9, -1], &[2, 2]);
        let m = t.max_axes(&[1]).unwrap();
        assert_eq!(m.as_slice::<i32>().unwrap(), &[-2, -1]);
    }

    #[test]
    fn test_invalid_axis() {
        let t = Tensor::from_f32(&[1.0, 2.0], &[2]);
        assert!(matches!(
            t.sum_axes(&[1]),
            Err(TesseraError::InvalidAxis { axis: 1, ndim: 1 })
        ));
        assert!(t.sum_axes(&[0, 0]).is_err());
        assert!(t.sum_axes(&[]).is_err());
    }
}
