//! Element-wise arithmetic operations on tensors.

use crate::dtype::Element;
use crate::error::TesseraError;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::{with_element, Result};

/// Operation selector for the generic binary kernel. Closures cannot cross the
/// dtype dispatch boundary, so the kernel matches on this instead.
#[derive(Clone, Copy)]
enum BinaryOp {
    Add,
    Div,
}

impl Tensor {
    /// Element-wise addition with broadcasting: self + other.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, BinaryOp::Add)
    }

    /// Element-wise division with broadcasting: self / other.
    pub fn div(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, BinaryOp::Div)
    }

    /// Divide every element by a scalar (cast to the tensor's dtype first, so
    /// integer tensors use integer division).
    pub fn div_scalar(&self, scalar: f64) -> Result<Tensor> {
        with_element!(self.dtype(), T, { div_scalar_t::<T>(self, scalar) })
    }

    /// Outer product: out[i..., j...] = self[i...] * other[j...].
    ///
    /// The output shape is the concatenation of both input shapes, so folding
    /// 1-D factors builds up a dense product grid one axis at a time.
    pub fn outer(&self, other: &Tensor) -> Result<Tensor> {
        if self.dtype() != other.dtype() {
            return Err(TesseraError::DTypeMismatch {
                expected: self.dtype(),
                got: other.dtype(),
            });
        }
        with_element!(self.dtype(), T, { outer_t::<T>(self, other) })
    }
}

fn binary_op(a: &Tensor, b: &Tensor, op: BinaryOp) -> Result<Tensor> {
    if a.dtype() != b.dtype() {
        return Err(TesseraError::DTypeMismatch {
            expected: a.dtype(),
            got: b.dtype(),
        });
    }
    with_element!(a.dtype(), T, { binary_op_t::<T>(a, b, op) })
}

fn binary_op_t<T: Element>(a: &Tensor, b: &Tensor, op: BinaryOp) -> Result<Tensor> {
    let apply = |x: T, y: T| match op {
        BinaryOp::Add => x + y,
        BinaryOp::Div => x / y,
    };

    let out_shape = a.shape().broadcast_with(b.shape()).ok_or_else(|| {
        TesseraError::BroadcastError {
            a: a.shape().dims().to_vec(),
            b: b.shape().dims().to_vec(),
        }
    })?;

    let numel = out_shape.numel();
    let mut result = vec![T::zero(); numel];

    // Fast path: same shape, both contiguous
    if a.shape() == b.shape() && a.is_contiguous() && b.is_contiguous() {
        let a_data = a.as_slice::<T>().unwrap();
        let b_data = b.as_slice::<T>().unwrap();
        for i in 0..numel {
            result[i] = apply(a_data[i], b_data[i]);
        }
    } else {
        // General broadcast path
        let a_cont = a.contiguous();
        let b_cont = b.contiguous();
        let a_data = a_cont.as_slice::<T>().unwrap();
        let b_data = b_cont.as_slice::<T>().unwrap();

        for i in 0..numel {
            let a_idx = broadcast_index(i, &out_shape, a.shape());
            let b_idx = broadcast_index(i, &out_shape, b.shape());
            result[i] = apply(a_data[a_idx], b_data[b_idx]);
        }
    }

    Ok(Tensor::from_elems(&result, out_shape.dims()))
}

/// Compute the source index for a broadcasted element.
fn broadcast_index(flat_idx: usize, out_shape: &Shape, src_shape: &Shape) -> usize {
    let out_dims = out_shape.dims();
    let src_dims = src_shape.dims();
    let out_ndim = out_dims.len();
    let src_ndim = src_dims.len();

    let mut remaining = flat_idx;
    let mut src_idx = 0;
    let out_strides = out_shape.contiguous_strides();
    let src_strides = src_shape.contiguous_strides();

    for i in 0..out_ndim {
        let coord = remaining / out_strides[i];
        remaining %= out_strides[i];

        let src_dim_idx = i as isize - (out_ndim as isize - src_ndim as isize);
        if src_dim_idx >= 0 {
            let si = src_dim_idx as usize;
            if src_dims[si] > 1 {
                src_idx += coord * src_strides[si];
            }
            // If src_dims[si] == 1, it's broadcast — coord maps to 0
        }
    }

    src_idx
}

fn div_scalar_t<T: Element>(t: &Tensor, scalar: f64) -> Result<Tensor> {
    let divisor = T::from_f64(scalar).ok_or(TesseraError::UnsupportedDType(T::DTYPE))?;
    let c = t.contiguous();
    let data = c.as_slice::<T>().unwrap();
    let result: Vec<T> = data.iter().map(|&v| v / divisor).collect();
    Ok(Tensor::from_elems(&result, c.shape().dims()))
}

fn outer_t<T: Element>(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let a_cont = a.contiguous();
    let b_cont = b.contiguous();
    let a_data = a_cont.as_slice::<T>().unwrap();
    let b_data = b_cont.as_slice::<T>().unwrap();

    let bn = b_data.len();
    let mut result = vec![T::zero(); a_data.len() * bn];
    for (i, &x) in a_data.iter().enumerate() {
        for (j, &y) in b_data.iter().enumerate() {
            result[i * bn + j] = x * y;
        }
    }

    let mut dims: Vec<usize> = a.shape().dims().to_vec();
    dims.extend_from_slice(b.shape().dims());
    Ok(Tensor::from_elems(&result, &dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_add() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let b = Tensor::from_f32(&[10.0, 20.0, 30.0], &[3]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.as_f32_slice().unwrap(), &[11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_add_i64() {
        let a = Tensor::from_i64(&[0, 2, 1, 3], &[4]);
        let b = Tensor::from_i64(&[0, 4, 8, 12], &[4]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.as_slice::<i64>().unwrap(), &[0, 6, 9, 15]);
        assert_eq!(c.dtype(), DType::I64);
    }

    #[test]
    fn test_add_broadcast() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = Tensor::from_f32(&[10.0, 20.0, 30.0], &[3]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 3]);
        assert_eq!(
            c.as_f32_slice().unwrap(),
            &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
        );
    }

    #[test]
    fn test_div_broadcast_trailing() {
        // [b, c, out] / [out] — the shape pattern divisor correction uses
        let a = Tensor::from_f32(&[2.0, 6.0, 4.0, 12.0], &[1, 2, 2]);
        let b = Tensor::from_f32(&[2.0, 3.0], &[2]);
        let c = a.div(&b).unwrap();
        assert_eq!(c.shape().dims(), &[1, 2, 2]);
        assert_eq!(c.as_f32_slice().unwrap(), &[1.0, 2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_dtype_mismatch() {
        let a = Tensor::from_f32(&[1.0], &[1]);
        let b = Tensor::from_f64(&[1.0], &[1]);
        assert!(matches!(
            a.add(&b),
            Err(TesseraError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_broadcast_incompatible() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let b = Tensor::from_f32(&[1.0, 2.0], &[2]);
        assert!(matches!(
            a.add(&b),
            Err(TesseraError::BroadcastError { .. })
        ));
    }

    #[test]
    fn test_div_scalar() {
        let a = Tensor::from_f32(&[2.0, 4.0, 6.0], &[3]);
        let c = a.div_scalar(2.0).unwrap();
        assert_eq!(c.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0]);

        // Integer division truncates
        let a = Tensor::from_i32(&[7, 8], &[2]);
        let c = a.div_scalar(2.0).unwrap();
        assert_eq!(c.as_slice::<i32>().unwrap(), &[3, 4]);
    }

    #[test]
    fn test_outer() {
        let a = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let b = Tensor::from_f32(&[3.0, 4.0, 5.0], &[3]);
        let c = a.outer(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 3]);
        assert_eq!(c.as_f32_slice().unwrap(), &[3.0, 4.0, 5.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_outer_fold() {
        // Folding per-axis factors into a grid: [2] ⊗ [2] → [2, 2]
        let rows = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let cols = Tensor::from_f32(&[2.0, 4.0], &[2]);
        let grid = rows.outer(&cols).unwrap();
        assert_eq!(grid.as_f32_slice().unwrap(), &[2.0, 4.0, 4.0, 8.0]);

        let deep = grid.outer(&Tensor::from_f32(&[10.0], &[1])).unwrap();
        assert_eq!(deep.shape().dims(), &[2, 2, 1]);
        assert_eq!(deep.as_f32_slice().unwrap(), &[20.0, 40.0, 40.0, 80.0]);
    }
}
