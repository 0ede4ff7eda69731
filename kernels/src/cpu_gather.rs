use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Copies a strided view into a fresh row-major buffer.
///
/// Element `[i0, i1, ..., in]` of the view lives at
/// `offset + i0 * strides[0] + ... + in * strides[n]` in `data`.
///
/// We parallelize over the rows (last dimension) of the OUTPUT buffer: each row
/// is written by exactly one task.
pub fn cpu_gather_strided<T: KernelElem>(
    data: &[T],
    shape: &[usize],
    strides: &[usize],
    offset: usize,
) -> Result<Vec<T>> {
    if shape.len() != strides.len() {
        return Err(KernelError::ShapeMismatch {
            expected: vec![shape.len()],
            got: vec![strides.len()],
        });
    }

    let size: usize = shape.iter().product();
    if size == 0 {
        return Ok(Vec::new());
    }

    // Highest address the view can touch.
    let last = offset
        + shape
            .iter()
            .zip(strides)
            .map(|(&dim, &stride)| (dim - 1) * stride)
            .sum::<usize>();
    if last >= data.len() {
        return Err(KernelError::InvalidArgument(format!(
            "strided view reaches element {} of a buffer of length {}",
            last,
            data.len()
        )));
    }

    let rank = shape.len();
    if rank == 0 {
        return Ok(vec![data[offset]]);
    }

    let row_len = shape[rank - 1];
    let row_stride = strides[rank - 1];
    let mut out = vec![T::zero(); size];

    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, out_row)| {
            // Decompose the flat row index over the leading dimensions.
            let mut rem = row;
            let mut base = offset;
            for d in (0..rank - 1).rev() {
                base += (rem % shape[d]) * strides[d];
                rem /= shape[d];
            }
            for (i, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[base + i * row_stride];
            }
        });

    Ok(out)
}
