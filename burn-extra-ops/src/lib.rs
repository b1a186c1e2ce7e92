//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used in deep learning but are not
//! yet available in the core Burn framework.

use burn::{prelude::*, tensor::BasicOps};

mod repeat_interleave;
mod trunc_normal;

// Convenient re-exports
pub use repeat_interleave::repeat_interleave;
pub use trunc_normal::{trunc_normal, TRUNCATION_STDDEVS};

/// Additional operations for 1-D Burn tensors
pub trait TensorExtraOps<B: Backend, K: BasicOps<B>> {
    /// Repeat every element `repeats` times in place, like `numpy.repeat`.
    fn repeat_elements(self, repeats: usize) -> Tensor<B, 1, K>;
}

impl<B: Backend, K: BasicOps<B>> TensorExtraOps<B, K> for Tensor<B, 1, K> {
    fn repeat_elements(self, repeats: usize) -> Tensor<B, 1, K> {
        repeat_interleave(self, repeats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArray, Autodiff};

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_tensor_extra_ops() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1, Int>::arange(0..3, &device);

        let result = tensor.repeat_elements(2);
        assert_eq!(
            result.into_data().to_vec::<i64>().unwrap(),
            vec![0, 0, 1, 1, 2, 2]
        );
    }
}
