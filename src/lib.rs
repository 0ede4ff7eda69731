//! # spatial-pool
//!
//! `spatial-pool` implements 2D spatial max pooling over `[channels, height, width]`
//! feature maps, together with the backward pass used during back-propagation.
//!
//! The forward pass records, for every output cell, where inside its window the
//! maximum was found. The backward pass uses those offsets to add each upstream
//! gradient back onto the input position that produced it.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Strided N-dimensional tensor and the pooling operations on it.
//! - [`nn`]: The stateful [`nn::SpatialMaxPooling`] layer and its [`nn::PoolConfig`].
//!
//! ## Example
//!
//! ```rust
//! use spatial_pool::nn::{PoolConfig, SpatialMaxPooling};
//! use spatial_pool::tensor::Tensor;
//!
//! let input = Tensor::<f32, 3>::from_fn([1, 4, 4], |[_, h, w]| (h * 4 + w) as f32);
//! let mut pool = SpatialMaxPooling::new(PoolConfig::square(2, 2).unwrap());
//!
//! let output = pool.update_output(&input).unwrap();
//! assert_eq!(output.to_vec().unwrap(), vec![5.0, 7.0, 13.0, 15.0]);
//!
//! let grad_output = Tensor::<f32, 3>::ones([1, 2, 2]);
//! let grad_input = pool.update_grad_input(&input, &grad_output).unwrap();
//! assert_eq!(grad_input.get([0, 1, 1]), Some(1.0));
//! assert_eq!(grad_input.get([0, 0, 0]), Some(0.0));
//! ```

/// Macro for creating a Tensor with compile-time shape checking.
///
/// # Examples
///
/// ```rust
/// use spatial_pool::tensor;
/// use spatial_pool::tensor::Tensor;
///
/// // Works
/// let t = tensor!([1.0, 2.0, 3.0, 4.0], [1, 2, 2]);
///
/// // Fails to compile:
/// // let t = tensor!([1.0, 2.0, 3.0], [1, 2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($data:expr, $shape:expr) => {{
        // Constants to force compile-time evaluation
        const DATA_LEN: usize = $data.len();
        const SHAPE: [usize; $shape.len()] = $shape;
        const EXPECTED_SIZE: usize = {
            let mut size = 1;
            let mut i = 0;
            while i < SHAPE.len() {
                size *= SHAPE[i];
                i += 1;
            }
            size
        };

        // This assertion triggers a compile-time error if false
        const _: () = assert!(
            DATA_LEN == EXPECTED_SIZE,
            "Shape mismatch: data length does not match shape product"
        );

        // Safe to unwrap because we checked at compile time
        $crate::tensor::Tensor::new($data.to_vec(), $shape).unwrap()
    }};
}

pub mod nn;
pub mod tensor;

pub use nn::{PoolConfig, SpatialMaxPooling};
pub use tensor::Tensor;
