use super::{Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use spatial_pool_kernels::KernelError;
use tracing::debug;

impl From<KernelError> for TensorError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::ShapeMismatch { expected, got } => {
                TensorError::ShapeMismatch { expected, got }
            }
            KernelError::InvalidArgument(msg) => TensorError::InvalidArgument(msg),
        }
    }
}

impl<T> Tensor<T, 3>
where
    T: TensorElem + Float,
{
    /// Performs 2D Max Pooling over a `[channels, height, width]` volume.
    ///
    /// # Arguments
    ///
    /// * `kernel_size` - Size of the pooling window `[k_h, k_w]`.
    /// * `stride` - Stride of the pooling `[stride_h, stride_w]`.
    ///
    /// # Returns
    ///
    /// `(output, indices)`: the pooled volume of shape `[channels, out_h, out_w]` and the
    /// argmax offsets of shape `[2, channels, out_h, out_w]` (plane 0 rows, plane 1 columns,
    /// zero-based within each window). Pass `indices` to [`Tensor::max_pool2d_backward`].
    ///
    /// # Errors
    ///
    /// Returns `TensorError::InvalidArgument` if any dimension, kernel extent or stride is zero,
    /// or if the input is smaller than the kernel. Nothing is allocated in that case.
    pub fn max_pool2d_with_indices(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
    ) -> Result<(Tensor<T, 3>, Tensor<usize, 4>)> {
        let [channels, in_h, in_w] = self.shape;
        let (out_h, out_w) = spatial_pool_kernels::pool_output_size(in_h, in_w, kernel_size, stride)?;

        debug!(
            input = ?self.shape,
            ?kernel_size,
            ?stride,
            output = ?[channels, out_h, out_w],
            "max_pool2d forward"
        );

        let input = self.contiguous()?;
        let (out_data, index_data) = spatial_pool_kernels::cpu_max_pool2d_with_indices(
            &input,
            &self.shape,
            kernel_size,
            stride,
        )?;

        let output = Tensor::new(out_data, [channels, out_h, out_w])?;
        let indices = Tensor::new(index_data, [2, channels, out_h, out_w])?;
        Ok((output, indices))
    }
}

impl<T> Tensor<T, 3>
where
    T: TensorElem,
{
    /// Routes this upstream gradient back to the input of a 2D Max Pooling.
    ///
    /// `self` is the gradient w.r.t. the pooled output; `indices` must come from the
    /// [`Tensor::max_pool2d_with_indices`] call that produced that output, with the same
    /// `kernel_size` and `stride`, on an input of shape `input_shape`.
    ///
    /// The result is zero everywhere except at recorded argmax positions, where the
    /// gradients of every output cell selecting that position are summed.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if `self` or `indices` do not have the shapes a
    /// forward pass over `input_shape` would produce, and `TensorError::InvalidArgument` if
    /// the configuration is invalid or an offset lies outside the kernel window.
    pub fn max_pool2d_backward(
        &self,
        input_shape: [usize; 3],
        indices: &Tensor<usize, 4>,
        kernel_size: [usize; 2],
        stride: [usize; 2],
    ) -> Result<Tensor<T, 3>> {
        let [channels, in_h, in_w] = input_shape;
        let (out_h, out_w) = spatial_pool_kernels::pool_output_size(in_h, in_w, kernel_size, stride)?;

        let expected = [channels, out_h, out_w];
        if self.shape != expected {
            return Err(TensorError::ShapeMismatch {
                expected: expected.to_vec(),
                got: self.shape.to_vec(),
            });
        }
        let expected_indices = [2, channels, out_h, out_w];
        if indices.shape() != &expected_indices {
            return Err(TensorError::ShapeMismatch {
                expected: expected_indices.to_vec(),
                got: indices.shape().to_vec(),
            });
        }

        debug!(
            input = ?input_shape,
            grad_output = ?self.shape,
            ?kernel_size,
            ?stride,
            "max_pool2d backward"
        );

        let grad_output = self.contiguous()?;
        let index_data = indices.contiguous()?;
        let grad_input = spatial_pool_kernels::cpu_max_pool2d_backward(
            &grad_output,
            &index_data,
            &input_shape,
            kernel_size,
            stride,
        )?;

        Tensor::new(grad_input, input_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pool2d_with_indices() {
        #[rustfmt::skip]
        let data = vec![
            1.0, 3.0, 2.0, 0.0,
            5.0, 4.0, 6.0, 1.0,
            0.0, 2.0, 1.0, 8.0,
            3.0, 3.0, 7.0, 2.0,
        ];
        let input = Tensor::<f32, 3>::new(data, [1, 4, 4]).unwrap();

        let (output, indices) = input.max_pool2d_with_indices([2, 2], [2, 2]).unwrap();
        assert_eq!(output.shape(), &[1, 2, 2]);
        assert_eq!(output.to_vec().unwrap(), vec![5.0, 6.0, 3.0, 8.0]);
        assert_eq!(indices.shape(), &[2, 1, 2, 2]);
        assert_eq!(indices.get([0, 0, 1, 1]), Some(0));
        assert_eq!(indices.get([1, 0, 1, 1]), Some(1));
    }

    #[test]
    fn test_max_pool2d_kernel_too_large() {
        let input = Tensor::<f32, 3>::zeros([1, 4, 4]);
        for stride in 1..4 {
            let err = input.max_pool2d_with_indices([5, 5], [stride, stride]);
            assert!(matches!(err, Err(TensorError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_max_pool2d_zero_channels() {
        let input = Tensor::<f32, 3>::zeros([0, 4, 4]);
        let err = input.max_pool2d_with_indices([2, 2], [2, 2]);
        assert!(matches!(err, Err(TensorError::InvalidArgument(_))));
    }

    #[test]
    fn test_backward_shape_checks() {
        let input = Tensor::<f32, 3>::zeros([2, 4, 4]);
        let (output, indices) = input.max_pool2d_with_indices([2, 2], [2, 2]).unwrap();

        // Gradient with the wrong spatial size.
        let bad_grad = Tensor::<f32, 3>::ones([2, 3, 3]);
        let err = bad_grad.max_pool2d_backward([2, 4, 4], &indices, [2, 2], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));

        // Indices with the wrong channel count.
        let bad_indices = Tensor::<usize, 4>::zeros([2, 1, 2, 2]);
        let grad = Tensor::<f32, 3>::ones(*output.shape());
        let err = grad.max_pool2d_backward([2, 4, 4], &bad_indices, [2, 2], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));

        // Input shape that does not match the forward pass.
        let err = grad.max_pool2d_backward([2, 6, 6], &indices, [2, 2], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_backward_corrupt_indices() {
        let grad = Tensor::<f32, 3>::ones([1, 1, 1]);
        let indices = Tensor::<usize, 4>::new(vec![3, 0], [2, 1, 1, 1]).unwrap();
        let err = grad.max_pool2d_backward([1, 2, 2], &indices, [2, 2], [1, 1]);
        assert!(matches!(err, Err(TensorError::InvalidArgument(_))));
    }

    #[test]
    fn test_kernel_error_conversion() {
        let err: TensorError = KernelError::InvalidArgument("bad".to_string()).into();
        assert_eq!(err, TensorError::InvalidArgument("bad".to_string()));
    }
}
