//! Gather and scatter operations on flat tensors.
//!
//! Both operate on a 1-D base tensor addressed by an `i64` index tensor of any
//! shape. This is the addressing mode gradient routing uses: a flat buffer of
//! slots, an index per routed value.

use crate::dtype::{DType, Element};
use crate::error::TesseraError;
use crate::tensor::Tensor;
use crate::{with_element, Result};

impl Tensor {
    /// Gather elements from a 1-D tensor: out[i...] = self[indices[i...]].
    ///
    /// The output has the shape of `indices` and the dtype of `self`. Indices
    /// must lie in `0..len`.
    pub fn take(&self, indices: &Tensor) -> Result<Tensor> {
        if self.ndim() != 1 {
            return Err(TesseraError::StorageError(format!(
                "take: source must be 1-D, got shape {}",
                self.shape()
            )));
        }
        if indices.dtype() != DType::I64 {
            return Err(TesseraError::DTypeMismatch {
                expected: DType::I64,
                got: indices.dtype(),
            });
        }
        with_element!(self.dtype(), T, { take_t::<T>(self, indices) })
    }

    /// Scatter-add into a 1-D tensor: out = self, then out[indices[i...]] +=
    /// src[i...] for every index position.
    ///
    /// Repeated indices accumulate. `src` must match the shape of `indices`
    /// and the dtype of `self`.
    pub fn index_add(&self, indices: &Tensor, src: &Tensor) -> Result<Tensor> {
        if self.ndim() != 1 {
            return Err(TesseraError::StorageError(format!(
                "index_add: base must be 1-D, got shape {}",
                self.shape()
            )));
        }
        if indices.dtype() != DType::I64 {
            return Err(TesseraError::DTypeMismatch {
                expected: DType::I64,
                got: indices.dtype(),
            });
        }
        if src.dtype() != self.dtype() {
            return Err(TesseraError::DTypeMismatch {
                expected: self.dtype(),
                got: src.dtype(),
            });
        }
        if indices.shape().dims() != src.shape().dims() {
            return Err(TesseraError::ShapeMismatch {
                expected: indices.shape().dims().to_vec(),
                got: src.shape().dims().to_vec(),
            });
        }
        with_element!(self.dtype(), T, { index_add_t::<T>(self, indices, src) })
    }
}

fn take_t<T: Element>(t: &Tensor, indices: &Tensor) -> Result<Tensor> {
    let data_cont = t.contiguous();
    let data = data_cont.as_slice::<T>().unwrap();
    let idx_cont = indices.contiguous();
    let idx = idx_cont.as_slice::<i64>().unwrap();

    let len = data.len() as i64;
    let mut result = Vec::with_capacity(idx.len());
    for &i in idx {
        if i < 0 || i >= len {
            return Err(TesseraError::StorageError(format!(
                "take: index {i} out of range for length {len}"
            )));
        }
        result.push(data[i as usize]);
    }
    Ok(Tensor::from_elems(&result, indices.shape().dims()))
}

fn index_add_t<T: Element>(base: &Tensor, indices: &Tensor, src: &Tensor) -> Result<Tensor> {
    let base_cont = base.contiguous();
    let mut out: Vec<T> = base_cont.as_slice::<T>().unwrap().to_vec();
    let idx_cont = indices.contiguous();
    let idx = idx_cont.as_slice::<i64>().unwrap();
    let src_cont = src.contiguous();
    let src_data = src_cont.as_slice::<T>().unwrap();

    let len = out.len() as i64;
    for (&i, &v) in idx.iter().zip(src_data.iter()) {
        if i < 0 || i >= len {
            return Err(TesseraError::StorageError(format!(
                "index_add: index {i} out of range for length {len}"
            )));
        }
        let slot = &mut out[i as usize];
        *slot = *slot + v;
    }
    Ok(Tensor::from_elems(&out, base.shape().dims()))
}
