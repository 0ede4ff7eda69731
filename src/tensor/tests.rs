use crate::tensor::{Tensor, TensorError};
use std::borrow::Cow;

#[test]
fn test_tensor_creation() {
    // Positive case
    let data = vec![1.0, 2.0, 3.0, 4.0];
    let tensor = Tensor::<f32, 2>::new(data.clone(), [2, 2]).unwrap();
    assert_eq!(tensor.shape(), &[2, 2]);
    assert_eq!(tensor.strides(), &[2, 1]);
    assert_eq!(tensor.to_vec().unwrap(), data);

    // Negative case: Size mismatch
    let err = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0], [2, 2]);
    assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
}

#[test]
fn test_zeros_ones() {
    let zeros = Tensor::<f32, 2>::zeros([2, 3]);
    assert_eq!(zeros.to_vec().unwrap(), vec![0.0; 6]);

    let ones = Tensor::<f32, 2>::ones([2, 3]);
    assert_eq!(ones.to_vec().unwrap(), vec![1.0; 6]);
}

#[test]
fn test_from_fn() {
    let t = Tensor::<f32, 3>::from_fn([2, 2, 3], |[c, h, w]| (c * 100 + h * 10 + w) as f32);
    assert_eq!(t.get([1, 0, 2]), Some(102.0));
    assert_eq!(t.get([0, 1, 1]), Some(11.0));
    assert_eq!(t.get([2, 0, 0]), None);
}

#[test]
fn test_reshape() {
    let tensor = Tensor::<f32, 2>::zeros([2, 3]); // 6 elements

    // Valid reshape
    let reshaped = tensor.reshape([3, 2]).unwrap();
    assert_eq!(reshaped.shape(), &[3, 2]);

    // Invalid reshape
    let err = reshaped.clone().reshape([4, 2]); // 8 elements
    assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
}

#[test]
fn test_reshape_view_materializes() {
    let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
    let flat = t.transpose_axes(0, 1).unwrap().reshape([6]).unwrap();
    assert_eq!(flat.to_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn test_contiguous_borrows_when_possible() {
    let t = Tensor::<f32, 3>::zeros([2, 3, 4]);
    assert!(t.is_contiguous());
    assert!(matches!(t.contiguous().unwrap(), Cow::Borrowed(_)));

    // Narrowing the outermost axis keeps the block contiguous.
    let channel = t.narrow(0, 1, 1).unwrap();
    assert!(channel.is_contiguous());
    assert!(matches!(channel.contiguous().unwrap(), Cow::Borrowed(_)));
}

#[test]
fn test_contiguous_copies_strided_view() {
    let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();

    let cols = t.narrow(1, 1, 2).unwrap();
    assert!(!cols.is_contiguous());
    let data = cols.contiguous().unwrap();
    assert!(matches!(data, Cow::Owned(_)));
    assert_eq!(&*data, &[2.0, 3.0, 5.0, 6.0]);

    // Source is untouched.
    assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_transpose_axes() {
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let t = Tensor::<f32, 2>::new(data, [2, 3]).unwrap();
    // [ 1 2 3 ]
    // [ 4 5 6 ]

    let t_t = t.transpose_axes(0, 1).unwrap();
    assert_eq!(t_t.shape(), &[3, 2]);
    assert_eq!(t_t.strides(), &[1, 3]);
    // [ 1 4 ]
    // [ 2 5 ]
    // [ 3 6 ]
    assert_eq!(t_t.to_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    let err = t.transpose_axes(0, 2);
    assert!(matches!(err, Err(TensorError::IndexOutOfBounds { .. })));
}

#[test]
fn test_step() {
    let t = Tensor::<f32, 1>::new((0..7).map(|i| i as f32).collect(), [7]).unwrap();
    let stepped = t.step(0, 3).unwrap();
    assert_eq!(stepped.shape(), &[3]);
    assert_eq!(stepped.to_vec().unwrap(), vec![0.0, 3.0, 6.0]);

    let err = t.step(0, 0);
    assert!(matches!(err, Err(TensorError::InvalidArgument(_))));
}

#[test]
fn test_narrow_out_of_bounds() {
    let t = Tensor::<f32, 2>::zeros([2, 3]);
    assert!(matches!(
        t.narrow(1, 2, 2),
        Err(TensorError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        t.narrow(2, 0, 1),
        Err(TensorError::IndexOutOfBounds { .. })
    ));
    // start + len wraps around usize.
    assert!(matches!(
        t.narrow(1, usize::MAX, 2),
        Err(TensorError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn test_step_stride_overflow() {
    let t = Tensor::<f32, 2>::zeros([2, 3]);
    // Row stride is 3, so any step above usize::MAX / 3 overflows it.
    let err = t.step(0, usize::MAX);
    assert!(matches!(err, Err(TensorError::InvalidArgument(_))));

    // A large step that still fits keeps only the first row.
    let first = t.step(0, usize::MAX / 3).unwrap();
    assert_eq!(first.shape(), &[1, 3]);
}

#[test]
fn test_data_mut_copy_on_write() {
    let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
    let mut view = t.narrow(0, 1, 1).unwrap();

    view.data_mut().unwrap()[0] = 10.0;
    assert_eq!(view.to_vec().unwrap(), vec![10.0, 4.0]);
    // Shared storage was copied, not written through.
    assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_macro() {
    let t = crate::tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
    assert_eq!(t.shape(), &[2, 2]);
    assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}
