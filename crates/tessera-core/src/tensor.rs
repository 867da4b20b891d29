use std::fmt;

use smallvec::SmallVec;

use crate::device::Device;
use crate::dtype::{DType, Element};
use crate::error::TesseraError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A multi-dimensional array — the fundamental data structure in Tessera.
///
/// Tensors support:
/// - Runtime dtype tags with statically dispatched kernels
/// - Zero-copy views (reshape, permute share storage)
/// - Copy-on-write storage, so retained snapshots are cheap
///
/// # Examples
///
/// ```
/// use tessera_core::Tensor;
///
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// assert_eq!(t.shape().dims(), &[2, 2]);
/// assert_eq!(t.numel(), 4);
///
/// // Reshape (zero-copy view)
/// let flat = t.reshape(&[4]).unwrap();
/// assert_eq!(flat.shape().dims(), &[4]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 8]>,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor from a slice of elements with the given shape.
    pub fn from_elems<T: Element>(data: &[T], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "from_elems: shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        let strides = s.contiguous_strides();
        Self {
            storage: Storage::from_elems(data),
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Create a tensor from f32 data with the given shape.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        Self::from_elems(data, shape)
    }

    /// Create a tensor from f64 data with the given shape.
    pub fn from_f64(data: &[f64], shape: &[usize]) -> Self {
        Self::from_elems(data, shape)
    }

    /// Create a tensor from i32 data with the given shape.
    pub fn from_i32(data: &[i32], shape: &[usize]) -> Self {
        Self::from_elems(data, shape)
    }

    /// Create a tensor from i64 data with the given shape.
    pub fn from_i64(data: &[i64], shape: &[usize]) -> Self {
        Self::from_elems(data, shape)
    }

    /// Create a tensor of zeros with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        let strides = s.contiguous_strides();
        Self {
            storage: Storage::zeros(dtype, s.numel()),
            shape: s,
            strides,
            offset: 0,
        }
    }

    /// Create an f32 tensor with random values from standard normal N(0,1).
    pub fn randn(shape: &[usize]) -> Self {
        use rand::Rng;
        let s = Shape::new(shape);
        let numel = s.numel();
        let mut rng = rand::thread_rng();
        // Box-Muller transform for normal distribution
        let data: Vec<f32> = (0..numel)
            .map(|_| {
                let u1: f32 = rng.gen_range(1e-7f32..1.0f32);
                let u2: f32 = rng.gen_range(0.0f32..std::f32::consts::TAU);
                (-2.0 * u1.ln()).sqrt() * u2.cos()
            })
            .collect();
        Self::from_f32(&data, shape)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Shape of the tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Device.
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Strides (in elements, not bytes).
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Whether this tensor is contiguous in memory (row-major).
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides() && self.offset == 0
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Get the underlying data as a typed slice (contiguous tensors only).
    /// Returns None if the dtype tag does not match `T`.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_slice::<T>()
    }

    /// Get a mutable typed slice (contiguous, copy-on-write).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_slice_mut::<T>()
    }

    /// Get the underlying f32 data as a slice (contiguous tensors only).
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        self.as_slice::<f32>()
    }

    /// Get a single element by logical flat index.
    pub fn get<T: Element>(&self, flat_index: usize) -> Option<T> {
        let slice = self.storage.as_slice::<T>()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Get a single f32 element by logical flat index.
    pub fn get_f32(&self, flat_index: usize) -> Option<f32> {
        self.get::<f32>(flat_index)
    }

    /// Convert a logical flat index to a physical storage index.
    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if self.shape.is_scalar() {
            return if flat_index == 0 {
                Some(self.offset)
            } else {
                None
            };
        }

        if flat_index >= self.numel() {
            return None;
        }

        // Convert flat index to multi-dimensional index
        let mut remaining = flat_index;
        let mut physical = self.offset;
        let contiguous_strides = self.shape.contiguous_strides();

        for (i, &cs) in contiguous_strides.iter().enumerate() {
            let idx = remaining / cs;
            remaining %= cs;
            physical += idx * self.strides[i];
        }

        Some(physical)
    }

    // =========================================================================
    // Shape operations (zero-copy views)
    // =========================================================================

    /// Reshape the tensor (zero-copy if contiguous).
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self.shape.resolve_reshape(new_shape).ok_or_else(|| {
            TesseraError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.iter().map(|&d| d.unsigned_abs()).collect(),
            }
        })?;

        if !self.is_contiguous() {
            return Err(TesseraError::StorageError(
                "reshape: non-contiguous tensor (call .contiguous() first)".into(),
            ));
        }

        let strides = resolved.contiguous_strides();
        Ok(Tensor {
            storage: self.storage.clone(), // Arc clone — shared data
            shape: resolved,
            strides,
            offset: self.offset,
        })
    }

    /// Reorder axes by the given permutation (zero-copy view).
    ///
    /// `axes` must contain each of `0..ndim` exactly once; output axis `i`
    /// maps to input axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<Tensor> {
        let ndim = self.ndim();
        if axes.len() != ndim {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![ndim],
                got: vec![axes.len()],
            });
        }
        let mut seen = vec![false; ndim];
        for &a in axes {
            if a >= ndim {
                return Err(TesseraError::InvalidAxis { axis: a, ndim });
            }
            if seen[a] {
                return Err(TesseraError::StorageError(format!(
                    "permute: duplicate axis {a}"
                )));
            }
            seen[a] = true;
        }

        let dims = self.shape.dims();
        let new_dims: SmallVec<[usize; 8]> = axes.iter().map(|&a| dims[a]).collect();
        let new_strides: SmallVec<[usize; 8]> = axes.iter().map(|&a| self.strides[a]).collect();

        Ok(Tensor {
            storage: self.storage.clone(),
            shape: Shape::new(&new_dims),
            strides: new_strides,
            offset: self.offset,
        })
    }

    /// Return a contiguous copy of this tensor if it isn't already contiguous.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return self.clone();
        }

        fn materialize<T: Element>(t: &Tensor) -> Option<Tensor> {
            let numel = t.numel();
            let mut data = vec![T::zero(); numel];
            for (i, slot) in data.iter_mut().enumerate() {
                *slot = t.get::<T>(i)?;
            }
            Some(Tensor::from_elems(&data, t.shape.dims()))
        }

        let result = match self.dtype() {
            DType::F32 => materialize::<f32>(self),
            DType::F64 => materialize::<f64>(self),
            DType::I8 => materialize::<i8>(self),
            DType::U8 => materialize::<u8>(self),
            DType::I32 => materialize::<i32>(self),
            DType::I64 => materialize::<i64>(self),
            // No kernels for half-precision tags; tensors of those dtypes are
            // contiguous by construction
            DType::F16 | DType::BF16 => None,
        };
        result.unwrap_or_else(|| self.clone())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={}, contiguous={})",
            self.shape,
            self.dtype(),
            self.device(),
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(data) = self.as_f32_slice() {
            if self.numel() <= 20 {
                write!(f, "tensor({:?}, shape={})", data, self.shape)
            } else {
                write!(
                    f,
                    "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                    data[0],
                    data[1],
                    data[self.numel() - 1],
                    self.shape
                )
            }
        } else {
            write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype())
        }
    }
}
