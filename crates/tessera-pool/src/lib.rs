//! # tessera-pool
//!
//! N-dimensional max and average pooling for the Tessera execution context:
//! forward, backward, and double-backward (max only), all expressed through a
//! dimension-agnostic column transform instead of per-rank loops.

pub mod col;
pub mod pool;
pub mod window;

pub use col::{col2im, im2col, swap_spatial_axes, PadValue};
pub use pool::{AvgPool, MaxPool, PadMode};
pub use window::Window;
