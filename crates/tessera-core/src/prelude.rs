//! Convenience re-exports for common tessera-core types.
//!
//! ```rust
//! use tessera_core::prelude::*;
//! ```

pub use crate::Tensor;
pub use crate::DType;
pub use crate::Device;
pub use crate::Shape;
pub use crate::TesseraError;
pub use crate::Result;
