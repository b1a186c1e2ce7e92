//! # Element Repeat
//!
//! `numpy.repeat` for one-dimensional tensors: every element is repeated in place, so
//! `[a, b]` with `repeats = 3` becomes `[a, a, a, b, b, b]`. This differs from
//! [`Tensor::repeat_dim`], which tiles the whole tensor (`[a, b, a, b, a, b]`).

use burn::{prelude::*, tensor::BasicOps};

/// Repeats every element of `input` `repeats` times, keeping element order.
///
/// A `repeats` of zero yields an empty tensor.
pub fn repeat_interleave<B: Backend, K: BasicOps<B>>(
    input: Tensor<B, 1, K>,
    repeats: usize,
) -> Tensor<B, 1, K> {
    let [len] = input.dims();
    input
        .reshape([len, 1])
        .repeat_dim(1, repeats)
        .reshape([len * repeats])
}
