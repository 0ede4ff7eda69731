use crate::nn::Module;
use crate::tensor::{Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kernel and stride of a 2D max pooling.
///
/// Serializable so the surrounding model can persist it alongside its weights.
/// A deserialized value should go through [`PoolConfig::validate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pooling window `[k_h, k_w]`.
    pub kernel_size: [usize; 2],
    /// Step between window origins `[stride_h, stride_w]`.
    pub stride: [usize; 2],
}

impl PoolConfig {
    /// Creates a new configuration.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidArgument` if any value is zero.
    pub fn new(k_h: usize, k_w: usize, stride_h: usize, stride_w: usize) -> Result<Self> {
        let config = Self {
            kernel_size: [k_h, k_w],
            stride: [stride_h, stride_w],
        };
        config.validate()?;
        Ok(config)
    }

    /// Convenience: square window and equal strides (e.g., 2×2 with stride 2).
    pub fn square(kernel_size: usize, stride: usize) -> Result<Self> {
        Self::new(kernel_size, kernel_size, stride, stride)
    }

    /// Checks that every kernel extent and stride is positive.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size.contains(&0) || self.stride.contains(&0) {
            return Err(TensorError::InvalidArgument(format!(
                "kernel size and stride must be positive, got kernel {:?} stride {:?}",
                self.kernel_size, self.stride
            )));
        }
        Ok(())
    }

    /// Spatial output size `(out_h, out_w)` for an `in_h × in_w` input.
    pub fn output_size(&self, in_h: usize, in_w: usize) -> Result<(usize, usize)> {
        Ok(spatial_pool_kernels::pool_output_size(
            in_h,
            in_w,
            self.kernel_size,
            self.stride,
        )?)
    }

    /// Full output shape `[channels, out_h, out_w]` for an input volume.
    pub fn output_shape(&self, input_shape: [usize; 3]) -> Result<[usize; 3]> {
        let [channels, in_h, in_w] = input_shape;
        let (out_h, out_w) = self.output_size(in_h, in_w)?;
        Ok([channels, out_h, out_w])
    }
}

/// 2D Max Pooling layer that keeps its buffers between passes.
///
/// [`update_output`](Self::update_output) stores the pooled output and the argmax
/// indices; [`update_grad_input`](Self::update_grad_input) consumes those indices to
/// route the upstream gradient. Both take `&mut self`, so a forward and a backward on
/// the same layer can never race.
///
/// Buffers are only replaced when a pass succeeds: after an error the layer still
/// holds the results of the last successful call.
#[derive(Debug)]
pub struct SpatialMaxPooling<T: TensorElem> {
    config: PoolConfig,
    input_shape: Option<[usize; 3]>,
    output: Option<Tensor<T, 3>>,
    indices: Option<Tensor<usize, 4>>,
    grad_input: Option<Tensor<T, 3>>,
}

impl<T: TensorElem> SpatialMaxPooling<T> {
    /// Creates a new layer with no cached state.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            input_shape: None,
            output: None,
            indices: None,
            grad_input: None,
        }
    }

    /// Creates a new layer from raw kernel and stride values.
    pub fn from_params(k_h: usize, k_w: usize, stride_h: usize, stride_w: usize) -> Result<Self> {
        Ok(Self::new(PoolConfig::new(k_h, k_w, stride_h, stride_w)?))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Output of the last successful forward pass.
    pub fn output(&self) -> Option<&Tensor<T, 3>> {
        self.output.as_ref()
    }

    /// Argmax offsets of the last successful forward pass, shape `[2, C, out_h, out_w]`.
    pub fn indices(&self) -> Option<&Tensor<usize, 4>> {
        self.indices.as_ref()
    }

    /// Gradient of the last successful backward pass.
    pub fn grad_input(&self) -> Option<&Tensor<T, 3>> {
        self.grad_input.as_ref()
    }

    /// Drops every cached buffer.
    pub fn clear_state(&mut self) {
        self.input_shape = None;
        self.output = None;
        self.indices = None;
        self.grad_input = None;
    }

    /// Routes `grad_output` back to the input of the last forward pass.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidArgument` if no forward pass has succeeded yet and
    /// `TensorError::ShapeMismatch` if `input` or `grad_output` do not match it.
    pub fn update_grad_input(
        &mut self,
        input: &Tensor<T, 3>,
        grad_output: &Tensor<T, 3>,
    ) -> Result<&Tensor<T, 3>> {
        let (Some(forward_shape), Some(indices)) = (self.input_shape, self.indices.as_ref()) else {
            return Err(TensorError::InvalidArgument(
                "update_grad_input called before update_output".to_string(),
            ));
        };
        if input.shape() != &forward_shape {
            return Err(TensorError::ShapeMismatch {
                expected: forward_shape.to_vec(),
                got: input.shape().to_vec(),
            });
        }

        let grad_input = grad_output.max_pool2d_backward(
            forward_shape,
            indices,
            self.config.kernel_size,
            self.config.stride,
        )?;
        Ok(self.grad_input.insert(grad_input))
    }
}

impl<T: TensorElem + Float> SpatialMaxPooling<T> {
    /// Performs the forward pass and caches the output and argmax indices.
    pub fn update_output(&mut self, input: &Tensor<T, 3>) -> Result<&Tensor<T, 3>> {
        self.config.validate()?;
        let (output, indices) =
            input.max_pool2d_with_indices(self.config.kernel_size, self.config.stride)?;

        debug!(layer = self.name(), output = ?output.shape(), "cached forward state");
        self.input_shape = Some(*input.shape());
        self.indices = Some(indices);
        Ok(self.output.insert(output))
    }

    /// Performs the forward pass without touching the cached state.
    pub fn forward(&self, input: &Tensor<T, 3>) -> Result<Tensor<T, 3>> {
        self.config.validate()?;
        let (output, _) =
            input.max_pool2d_with_indices(self.config.kernel_size, self.config.stride)?;
        Ok(output)
    }
}

impl<T: TensorElem> Module<T> for SpatialMaxPooling<T> {
    fn name(&self) -> &'static str {
        "SpatialMaxPooling"
    }
}
