//! Core Tensor implementation.
//!
//! This module defines the `Tensor` struct, the strided volume that the pooling
//! operations read from and write into.
//!
//! # Key Components
//!
//! - [`Tensor`]: An N-dimensional view over shared, row-major storage.
//! - [`TensorError`]: Error type for tensor operations.
//! - [`TensorElem`]: Trait bound for elements that can be stored in a tensor.
//!
//! # Views and contiguity
//!
//! [`Tensor::narrow`], [`Tensor::step`] and [`Tensor::transpose_axes`] return views
//! that share storage with their source and may have non-unit strides. Kernels only
//! understand flat row-major slices, so every operation first goes through
//! [`Tensor::contiguous`], which borrows the storage when the view is already
//! contiguous and gathers a temporary copy otherwise.
//!
//! # Examples
//!
//! ```rust
//! use spatial_pool::tensor::Tensor;
//!
//! let data = vec![1.0, 2.0, 3.0, 4.0];
//! let tensor = Tensor::<f32, 2>::new(data, [2, 2]).unwrap();
//! assert_eq!(tensor.shape(), &[2, 2]);
//! ```

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use spatial_pool_kernels::cpu_gather_strided;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

pub mod ops;

/// Error type for Tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// # Requirements
/// - `Copy + Clone`: Essential for efficient storage in contiguous memory (e.g., `Vec<T>`) and fast element access.
/// - `Num + ...`: Provides necessary numeric operations for tensor math.
/// - `Send + Sync`: Required for parallel execution via `rayon`.
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// The core Tensor struct.
///
/// Element `[i0, ..., in]` lives at `offset + sum(ik * strides[k])` in `data`.
/// Cloning a tensor or taking a view shares the storage.
///
/// # Generics
///
/// - `T`: The element type (must implement `TensorElem`).
/// - `RANK`: The number of dimensions (const generic).
#[derive(Clone)]
pub struct Tensor<T, const RANK: usize>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    strides: [usize; RANK],
    offset: usize,
    data: Arc<Vec<T>>,
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Creates a new Tensor from a vector of data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self::from_parts(data, shape))
    }

    /// Creates a new Tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        let size: usize = shape.iter().product();
        Self::from_parts(vec![T::zero(); size], shape)
    }

    /// Creates a new Tensor filled with ones.
    pub fn ones(shape: [usize; RANK]) -> Self {
        let size: usize = shape.iter().product();
        Self::from_parts(vec![T::one(); size], shape)
    }

    /// Creates a new Tensor by calling `f` with the multi-index of every element,
    /// in row-major order.
    pub fn from_fn<F>(shape: [usize; RANK], mut f: F) -> Self
    where
        F: FnMut([usize; RANK]) -> T,
    {
        let size: usize = shape.iter().product();
        let data = (0..size).map(|flat| f(unravel_index(flat, &shape))).collect();
        Self::from_parts(data, shape)
    }

    fn from_parts(data: Vec<T>, shape: [usize; RANK]) -> Self {
        Self {
            shape,
            strides: compute_strides(&shape),
            offset: 0,
            data: Arc::new(data),
        }
    }

    /// Reshapes the tensor to a new shape.
    ///
    /// The number of elements must remain the same. A non-contiguous view is
    /// materialized first.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the total number of elements in `new_shape`
    /// does not match the current size of the tensor.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK>> {
        let current_size = self.size();
        let new_size: usize = new_shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current_size],
                got: vec![new_size],
            });
        }

        let base = self.into_contiguous()?;
        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            offset: base.offset,
            data: base.data,
        })
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Returns the strides of the tensor.
    pub fn strides(&self) -> &[usize; RANK] {
        &self.strides
    }

    /// Returns the total number of elements in the tensor.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns the element at `index`, or `None` if it is out of bounds.
    pub fn get(&self, index: [usize; RANK]) -> Option<T> {
        if index.iter().zip(&self.shape).any(|(&i, &dim)| i >= dim) {
            return None;
        }
        let pos = self.offset
            + index
                .iter()
                .zip(&self.strides)
                .map(|(&i, &stride)| i * stride)
                .sum::<usize>();
        self.data.get(pos).copied()
    }

    /// Returns `true` if the logical elements occupy one gap-free row-major block.
    pub fn is_contiguous(&self) -> bool {
        let expected = compute_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(&expected))
            .all(|(&dim, (&stride, &want))| dim <= 1 || stride == want)
    }

    /// Returns the elements in row-major order.
    ///
    /// Borrows the storage when the view is already contiguous; otherwise gathers
    /// them into a temporary buffer that is freed when the returned value is dropped.
    /// The tensor itself is never modified.
    pub fn contiguous(&self) -> Result<Cow<'_, [T]>> {
        let size = self.size();
        if size == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        if self.is_contiguous() {
            return Ok(Cow::Borrowed(&self.data[self.offset..self.offset + size]));
        }

        trace!(shape = ?self.shape, strides = ?self.strides, "gathering strided view");
        let gathered = cpu_gather_strided(&self.data, &self.shape, &self.strides, self.offset)?;
        Ok(Cow::Owned(gathered))
    }

    /// Consumes the tensor and returns one whose storage is row-major.
    ///
    /// Contiguous tensors are returned as they are, without copying.
    pub fn into_contiguous(self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self);
        }
        let data = self.contiguous()?.into_owned();
        Ok(Self::from_parts(data, self.shape))
    }

    /// Copies the elements into a new vector in row-major order.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.contiguous()?.into_owned())
    }

    /// Returns a mutable slice over the elements in row-major order.
    ///
    /// Storage shared with other tensors or views is copied first, so writes never
    /// leak into them.
    pub fn data_mut(&mut self) -> Result<&mut [T]> {
        let size = self.size();
        if !self.is_contiguous() || self.offset != 0 || self.data.len() != size {
            let data = self.contiguous()?.into_owned();
            *self = Self::from_parts(data, self.shape);
        }
        Ok(Arc::make_mut(&mut self.data).as_mut_slice())
    }

    /// Returns a view restricted to `start..start + len` along `dim`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `dim` or the range fall outside the tensor.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        if dim >= RANK
            || start
                .checked_add(len)
                .map_or(true, |end| end > self.shape[dim])
        {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![dim, start, len],
                shape: self.shape.to_vec(),
            });
        }

        let mut view = self.clone();
        view.offset += start * self.strides[dim];
        view.shape[dim] = len;
        Ok(view)
    }

    /// Returns a view keeping every `step`-th element along `dim`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `dim` is out of bounds and
    /// `TensorError::InvalidArgument` if `step` is zero or the stepped stride overflows.
    pub fn step(&self, dim: usize, step: usize) -> Result<Self> {
        if dim >= RANK {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![dim],
                shape: self.shape.to_vec(),
            });
        }
        if step == 0 {
            return Err(TensorError::InvalidArgument("step must be positive".to_string()));
        }

        let stride = self.strides[dim].checked_mul(step).ok_or_else(|| {
            TensorError::InvalidArgument(format!(
                "step {} overflows stride {} along dim {}",
                step, self.strides[dim], dim
            ))
        })?;

        let mut view = self.clone();
        view.shape[dim] = self.shape[dim].div_ceil(step);
        view.strides[dim] = stride;
        Ok(view)
    }

    /// Swaps two axes of the tensor.
    ///
    /// Only the shape and strides are permuted; the storage is shared with `self`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `ax1` or `ax2` are out of bounds.
    pub fn transpose_axes(&self, ax1: usize, ax2: usize) -> Result<Self> {
        if ax1 >= RANK || ax2 >= RANK {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![ax1, ax2],
                shape: self.shape.to_vec(),
            });
        }

        let mut view = self.clone();
        view.shape.swap(ax1, ax2);
        view.strides.swap(ax1, ax2);
        Ok(view)
    }
}

/// Computes the strides for a given shape.
///
/// Strides represent the number of elements to skip in memory to move to the next element
/// along a specific dimension. This implementation assumes a row-major (C-style) memory layout.
pub(crate) fn compute_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [0; RANK];
    let mut stride = 1;
    for i in (0..RANK).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

fn unravel_index<const RANK: usize>(mut flat: usize, shape: &[usize; RANK]) -> [usize; RANK] {
    let mut index = [0; RANK];
    for i in (0..RANK).rev() {
        index[i] = flat % shape[i];
        flat /= shape[i];
    }
    index
}

impl<T, const RANK: usize> Debug for Tensor<T, RANK>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
