//! Tensor operations.
//!
//! Operations are functional: they take tensors by reference and return new
//! tensors, so callers can keep their inputs alive for later gradient passes.

pub mod arithmetic;
pub mod indexing;
pub mod reduction;
