use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A Module trait for Neural Network layers.
///
/// All layers should implement this trait.
/// Currently, it serves as a marker trait requiring `Debug`, `Send`, and `Sync`, so a
/// layer can be handed to whichever thread drives the training loop.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    /// Short human readable name, used in logs.
    fn name(&self) -> &'static str;
}
