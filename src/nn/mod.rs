//! Neural network layers built on top of [`crate::tensor`].

pub mod module;
pub mod pool;

pub use module::Module;
pub use pool::{PoolConfig, SpatialMaxPooling};
