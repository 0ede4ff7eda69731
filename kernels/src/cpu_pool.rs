use crate::{KernelElem, KernelError, Result};
use num_traits::Float;
use rayon::prelude::*;

/// Computes the spatial output size of a max pooling window sweep.
///
/// `out = (in - k) / stride + 1` along each axis. No padding is ever applied,
/// so the input must be at least as large as the kernel.
pub fn pool_output_size(
    in_h: usize,
    in_w: usize,
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> Result<(usize, usize)> {
    let [k_h, k_w] = kernel_size;
    let [stride_h, stride_w] = stride;

    if k_h == 0 || k_w == 0 {
        return Err(KernelError::InvalidArgument(format!(
            "kernel size must be positive, got {}x{}",
            k_h, k_w
        )));
    }
    if stride_h == 0 || stride_w == 0 {
        return Err(KernelError::InvalidArgument(format!(
            "stride must be positive, got {}x{}",
            stride_h, stride_w
        )));
    }
    if in_h < k_h || in_w < k_w {
        return Err(KernelError::InvalidArgument(format!(
            "input image smaller than kernel size: {}x{} < {}x{}",
            in_h, in_w, k_h, k_w
        )));
    }

    Ok(((in_h - k_h) / stride_h + 1, (in_w - k_w) / stride_w + 1))
}

fn volume_dims(shape: &[usize]) -> Result<[usize; 3]> {
    let dims: [usize; 3] = shape.try_into().map_err(|_| {
        KernelError::InvalidArgument(format!("3D tensor expected, got rank {}", shape.len()))
    })?;
    if dims.contains(&0) {
        return Err(KernelError::InvalidArgument(format!(
            "input dimensions must be positive, got {:?}",
            dims
        )));
    }
    Ok(dims)
}

/// Performs 2D Max Pooling on CPU and records where each maximum came from.
///
/// # Arguments
///
/// * `input` - Contiguous input data (flattened). Shape: `[channels, height, width]`
/// * `input_shape` - Shape of the input volume.
/// * `kernel_size` - Size of the pooling window: `[k_h, k_w]`
/// * `stride` - Stride of the pooling: `[stride_h, stride_w]`
///
/// # Returns
///
/// `(output, indices)` where `output` has shape `[channels, out_h, out_w]` and
/// `indices` has shape `[2, channels, out_h, out_w]`. Plane 0 of `indices` holds the
/// zero-based row offset of the maximum inside its window, plane 1 the column offset.
/// Ties resolve to the first element in row-major scan order.
pub fn cpu_max_pool2d_with_indices<T: KernelElem + Float>(
    input: &[T],
    input_shape: &[usize],
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> Result<(Vec<T>, Vec<usize>)> {
    let [channels, in_h, in_w] = volume_dims(input_shape)?;
    let (out_h, out_w) = pool_output_size(in_h, in_w, kernel_size, stride)?;

    let in_plane = in_h * in_w;
    if input.len() != channels * in_plane {
        return Err(KernelError::ShapeMismatch {
            expected: vec![channels * in_plane],
            got: vec![input.len()],
        });
    }

    let [k_h, k_w] = kernel_size;
    let [stride_h, stride_w] = stride;
    let out_plane = out_h * out_w;

    let mut output = vec![T::zero(); channels * out_plane];
    let mut indices = vec![0usize; 2 * channels * out_plane];
    let (row_plane, col_plane) = indices.split_at_mut(channels * out_plane);

    // Channels are independent: each reads its own input slice and writes its own
    // output and index slices.
    output
        .par_chunks_mut(out_plane)
        .zip(row_plane.par_chunks_mut(out_plane))
        .zip(col_plane.par_chunks_mut(out_plane))
        .zip(input.par_chunks(in_plane))
        .for_each(|(((channel_out, rows_out), cols_out), channel_in)| {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h_start = oh * stride_h;
                    let w_start = ow * stride_w;

                    let mut max_val = T::neg_infinity();
                    let mut max_idx = 0;

                    for kh in 0..k_h {
                        let row_start = (h_start + kh) * in_w + w_start;
                        let window_row = &channel_in[row_start..row_start + k_w];
                        for (kw, &val) in window_row.iter().enumerate() {
                            // Strict comparison keeps the first occurrence on ties.
                            if val > max_val {
                                max_val = val;
                                max_idx = kh * k_w + kw;
                            }
                        }
                    }

                    let cell = oh * out_w + ow;
                    channel_out[cell] = max_val;
                    rows_out[cell] = max_idx / k_w;
                    cols_out[cell] = max_idx % k_w;
                }
            }
        });

    Ok((output, indices))
}

/// Routes an upstream gradient back through a 2D Max Pooling.
///
/// # Arguments
///
/// * `grad_output` - Contiguous gradient w.r.t. the pooled output. Shape: `[channels, out_h, out_w]`
/// * `indices` - Argmax offsets produced by [`cpu_max_pool2d_with_indices`] for the same
///   configuration. Shape: `[2, channels, out_h, out_w]`
/// * `input_shape` - Shape of the original input: `[channels, height, width]`
/// * `kernel_size` - Size of the pooling window: `[k_h, k_w]`
/// * `stride` - Stride of the pooling: `[stride_h, stride_w]`
///
/// # Returns
///
/// A zero-initialized buffer of `input_shape` into which every upstream value has been
/// added at its recorded argmax position. Overlapping windows that share an argmax
/// accumulate; nothing is overwritten.
pub fn cpu_max_pool2d_backward<T: KernelElem>(
    grad_output: &[T],
    indices: &[usize],
    input_shape: &[usize],
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> Result<Vec<T>> {
    let [channels, in_h, in_w] = volume_dims(input_shape)?;
    let (out_h, out_w) = pool_output_size(in_h, in_w, kernel_size, stride)?;

    let out_plane = out_h * out_w;
    if grad_output.len() != channels * out_plane {
        return Err(KernelError::ShapeMismatch {
            expected: vec![channels, out_h, out_w],
            got: vec![grad_output.len()],
        });
    }
    if indices.len() != 2 * channels * out_plane {
        return Err(KernelError::ShapeMismatch {
            expected: vec![2, channels, out_h, out_w],
            got: vec![indices.len()],
        });
    }

    let [k_h, k_w] = kernel_size;
    let [stride_h, stride_w] = stride;
    let (row_plane, col_plane) = indices.split_at(channels * out_plane);

    // Reject offsets outside the window before touching the output.
    if let Some(&bad) = row_plane.iter().find(|&&r| r >= k_h) {
        return Err(KernelError::InvalidArgument(format!(
            "row offset {} outside kernel height {}",
            bad, k_h
        )));
    }
    if let Some(&bad) = col_plane.iter().find(|&&c| c >= k_w) {
        return Err(KernelError::InvalidArgument(format!(
            "column offset {} outside kernel width {}",
            bad, k_w
        )));
    }

    let in_plane = in_h * in_w;
    let mut grad_input = vec![T::zero(); channels * in_plane];

    // Parallel across channels only: within a channel, overlapping windows may
    // scatter into the same input cell.
    grad_input
        .par_chunks_mut(in_plane)
        .zip(grad_output.par_chunks(out_plane))
        .zip(row_plane.par_chunks(out_plane))
        .zip(col_plane.par_chunks(out_plane))
        .for_each(|(((channel_grad_in, channel_grad_out), rows), cols)| {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let cell = oh * out_w + ow;
                    let ih = oh * stride_h + rows[cell];
                    let iw = ow * stride_w + cols[cell];
                    channel_grad_in[ih * in_w + iw] += channel_grad_out[cell];
                }
            }
        });

    Ok(grad_input)
}
