//! # tessera-core
//!
//! Core tensor engine for the Tessera execution context.
//!
//! Provides the foundational `Tensor` type with:
//! - Multiple dtypes (F16, BF16, F32, F64, I8, U8, I32, I64)
//! - Statically dispatched CPU kernels selected by runtime dtype tags
//! - Zero-copy views (reshape, permute)
//! - Copy-on-write shared storage
//! - Broadcasting arithmetic, multi-axis reductions, gather/scatter

pub mod dtype;
pub mod device;
pub mod storage;
pub mod shape;
pub mod tensor;
pub mod ops;
pub mod error;
pub mod prelude;

pub use dtype::{DType, Element};
pub use device::Device;
pub use storage::Storage;
pub use shape::Shape;
pub use tensor::Tensor;
pub use error::TesseraError;

pub type Result<T> = std::result::Result<T, TesseraError>;
