//! Pooling window descriptor.

use smallvec::SmallVec;
use tessera_core::{Result, TesseraError};

/// Per-axis pooling geometry: kernel extent, stride, and symmetric padding.
///
/// One entry per spatial axis; batch and channel axes are never pooled.
/// Padding is applied on both sides of an axis, so an input extent `d`
/// becomes `d + 2*pad` before windows are walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    kernel: SmallVec<[usize; 3]>,
    stride: SmallVec<[usize; 3]>,
    pad: SmallVec<[usize; 3]>,
}

impl Window {
    /// Create a window descriptor. All three slices must have one entry per
    /// spatial axis; kernel extents and strides must be nonzero.
    pub fn new(kernel: &[usize], stride: &[usize], pad: &[usize]) -> Result<Self> {
        if kernel.is_empty() {
            return Err(TesseraError::StorageError(
                "window: no spatial axes".into(),
            ));
        }
        if stride.len() != kernel.len() {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![kernel.len()],
                got: vec![stride.len()],
            });
        }
        if pad.len() != kernel.len() {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![kernel.len()],
                got: vec![pad.len()],
            });
        }
        if kernel.iter().any(|&k| k == 0) {
            return Err(TesseraError::StorageError(
                "window: zero kernel extent".into(),
            ));
        }
        if stride.iter().any(|&s| s == 0) {
            return Err(TesseraError::StorageError("window: zero stride".into()));
        }
        Ok(Self {
            kernel: SmallVec::from_slice(kernel),
            stride: SmallVec::from_slice(stride),
            pad: SmallVec::from_slice(pad),
        })
    }

    /// Convenience: the same kernel/stride/pad on every one of `ndim` axes.
    pub fn uniform(ndim: usize, kernel: usize, stride: usize, pad: usize) -> Result<Self> {
        let k = vec![kernel; ndim];
        let s = vec![stride; ndim];
        let p = vec![pad; ndim];
        Self::new(&k, &s, &p)
    }

    /// Number of spatial axes.
    pub fn ndim(&self) -> usize {
        self.kernel.len()
    }

    /// Kernel extents per axis.
    pub fn kernel(&self) -> &[usize] {
        &self.kernel
    }

    /// Strides per axis.
    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    /// Padding per axis (one side).
    pub fn pad(&self) -> &[usize] {
        &self.pad
    }

    /// Number of elements in one window block.
    pub fn kernel_total(&self) -> usize {
        self.kernel.iter().product()
    }

    /// Output extent along one axis.
    ///
    /// `(d + 2p - k)/s + 1`, or `(d + 2p - k + s - 1)/s + 1` under cover-all
    /// (every input element reaches at least one window, at the cost of a
    /// trailing partial window). A padded extent smaller than the kernel is
    /// an error.
    pub fn out_dim(&self, axis: usize, in_dim: usize, cover_all: bool) -> Result<usize> {
        if axis >= self.ndim() {
            return Err(TesseraError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }
        let k = self.kernel[axis];
        let s = self.stride[axis];
        let padded = in_dim + 2 * self.pad[axis];
        if padded < k {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![k],
                got: vec![padded],
            });
        }
        let out = if cover_all {
            (padded - k + s - 1) / s + 1
        } else {
            (padded - k) / s + 1
        };
        Ok(out)
    }

    /// Output extents for all spatial axes.
    pub fn out_dims(&self, spatial: &[usize], cover_all: bool) -> Result<Vec<usize>> {
        if spatial.len() != self.ndim() {
            return Err(TesseraError::ShapeMismatch {
                expected: vec![self.ndim()],
                got: vec![spatial.len()],
            });
        }
        (0..self.ndim())
            .map(|i| self.out_dim(i, spatial[i], cover_all))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validation() {
        assert!(Window::new(&[2, 2], &[1, 1], &[0, 0]).is_ok());
        assert!(Window::new(&[], &[], &[]).is_err());
        assert!(Window::new(&[2, 2], &[1], &[0, 0]).is_err());
        assert!(Window::new(&[2], &[1], &[0, 0]).is_err());
        assert!(Window::new(&[0], &[1], &[0]).is_err());
        assert!(Window::new(&[2], &[0], &[0]).is_err());
    }

    #[test]
    fn test_uniform() {
        let w = Window::uniform(3, 2, 2, 1).unwrap();
        assert_eq!(w.ndim(), 3);
        assert_eq!(w.kernel(), &[2, 2, 2]);
        assert_eq!(w.stride(), &[2, 2, 2]);
        assert_eq!(w.pad(), &[1, 1, 1]);
        assert_eq!(w.kernel_total(), 8);
    }

    #[test]
    fn test_out_dim() {
        let w = Window::new(&[2], &[2], &[0]).unwrap();
        assert_eq!(w.out_dim(0, 4, false).unwrap(), 2);

        let w = Window::new(&[2], &[2], &[1]).unwrap();
        assert_eq!(w.out_dim(0, 3, false).unwrap(), 2);

        let w = Window::new(&[3], &[1], &[0]).unwrap();
        assert_eq!(w.out_dim(0, 5, false).unwrap(), 3);
    }

    #[test]
    fn test_out_dim_cover_all() {
        // Stride 2 over 5 elements leaves element 4 uncovered without
        // cover-all; with it, a trailing partial window picks it up
        let w = Window::new(&[2], &[2], &[0]).unwrap();
        assert_eq!(w.out_dim(0, 5, false).unwrap(), 2);
        assert_eq!(w.out_dim(0, 5, true).unwrap(), 3);

        assert_eq!(w.out_dim(0, 4, false).unwrap(), 2);
        assert_eq!(w.out_dim(0, 4, true).unwrap(), 2);
    }

    #[test]
    fn test_out_dim_too_small() {
        let w = Window::new(&[5], &[1], &[0]).unwrap();
        assert!(w.out_dim(0, 3, false).is_err());
        // Padding can make up the difference
        let w = Window::new(&[5], &[1], &[1]).unwrap();
        assert_eq!(w.out_dim(0, 3, false).unwrap(), 1);
    }

    #[test]
    fn test_out_dims() {
        let w = Window::new(&[2, 3], &[2, 1], &[0, 1]).unwrap();
        let out = w.out_dims(&[4, 4], false).unwrap();
        assert_eq!(out, vec![2, 4]);

        assert!(w.out_dims(&[4], false).is_err());
    }
}
