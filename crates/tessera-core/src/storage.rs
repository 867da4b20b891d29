use std::sync::Arc;

use crate::{DType, Device, Element, Result, TesseraError};

/// Backing storage for tensor data.
///
/// Storage is reference-counted (`Arc`) so multiple tensors can share the same
/// underlying data (e.g., views from reshape/permute).
#[derive(Debug, Clone)]
pub enum StorageData {
    /// CPU heap-allocated storage.
    Cpu(Vec<u8>),
}

/// Shared, reference-counted tensor storage.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<StorageData>,
    dtype: DType,
    device: Device,
    /// Number of logical elements (not bytes).
    numel: usize,
}

impl Storage {
    /// Allocate new CPU storage for `numel` elements of the given dtype.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        let nbytes = dtype.storage_bytes(numel);
        let data = vec![0u8; nbytes];
        Self {
            data: Arc::new(StorageData::Cpu(data)),
            dtype,
            device: Device::Cpu,
            numel,
        }
    }

    /// Create storage from raw bytes (CPU).
    pub fn from_bytes(dtype: DType, numel: usize, bytes: Vec<u8>) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(TesseraError::StorageError(format!(
                "from_bytes: expected {} bytes for {} elements of {}, got {}",
                expected,
                numel,
                dtype,
                bytes.len()
            )));
        }
        Ok(Self {
            data: Arc::new(StorageData::Cpu(bytes)),
            dtype,
            device: Device::Cpu,
            numel,
        })
    }

    /// Create storage from a slice of elements.
    pub fn from_elems<T: Element>(data: &[T]) -> Self {
        let bytes: Vec<u8> = bytemuck::cast_slice(data).to_vec();
        Self {
            data: Arc::new(StorageData::Cpu(bytes)),
            dtype: T::DTYPE,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    /// Get the dtype of this storage.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Get the device of this storage.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        match self.data.as_ref() {
            StorageData::Cpu(v) => v.len(),
        }
    }

    /// Get a read-only reference to the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self.data.as_ref() {
            StorageData::Cpu(v) => v,
        }
    }

    /// Get a mutable reference to the raw bytes.
    /// This will clone the underlying data if there are other references (copy-on-write).
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let data = Arc::make_mut(&mut self.data);
        match data {
            StorageData::Cpu(v) => v,
        }
    }

    /// Interpret storage as a slice of `T`.
    /// Returns None if the dtype tag does not match `T`.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        if self.dtype != T::DTYPE {
            return None;
        }
        let bytes = self.as_bytes();
        // Safety: dtype tag verified; allocations come from Vec<u8> whose
        // backing allocation satisfies the primitive alignments in practice
        Some(bytemuck::cast_slice(bytes))
    }

    /// Interpret storage as a mutable slice of `T` (copy-on-write).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        if self.dtype != T::DTYPE {
            return None;
        }
        let bytes = self.as_bytes_mut();
        Some(bytemuck::cast_slice_mut(bytes))
    }

    /// Whether this storage is uniquely owned (no other Arc references).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let s = Storage::zeros(DType::F32, 10);
        assert_eq!(s.dtype(), DType::F32);
        assert_eq!(s.device(), Device::Cpu);
        assert_eq!(s.numel(), 10);
        assert_eq!(s.nbytes(), 40);
        assert!(s.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_elems() {
        let s = Storage::from_elems(&[1.0f32, 2.0, 3.0]);
        assert_eq!(s.numel(), 3);
        assert_eq!(s.dtype(), DType::F32);
        let slice = s.as_slice::<f32>().unwrap();
        assert_eq!(slice, &[1.0, 2.0, 3.0]);

        let s = Storage::from_elems(&[1i64, -2, 3]);
        assert_eq!(s.dtype(), DType::I64);
        assert_eq!(s.as_slice::<i64>().unwrap(), &[1, -2, 3]);
        // Wrong element type refuses the view
        assert!(s.as_slice::<f64>().is_none());
    }

    #[test]
    fn test_copy_on_write() {
        let s1 = Storage::from_elems(&[1.0f32, 2.0, 3.0]);
        let mut s2 = s1.clone();
        assert!(!s1.is_unique()); // shared

        // Mutating s2 should not affect s1
        let slice = s2.as_slice_mut::<f32>().unwrap();
        slice[0] = 99.0;

        assert_eq!(s1.as_slice::<f32>().unwrap()[0], 1.0);
        assert_eq!(s2.as_slice::<f32>().unwrap()[0], 99.0);
    }

    #[test]
    fn test_from_bytes_validation() {
        let result = Storage::from_bytes(DType::F32, 3, vec![0u8; 11]);
        assert!(result.is_err());

        let result = Storage::from_bytes(DType::F32, 3, vec![0u8; 12]);
        assert!(result.is_ok());
    }
}
