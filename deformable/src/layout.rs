//! # Layout Adapters
//!
//! The sampler works on single-channel planes, so channels are folded into the batch
//! axis before sampling and unfolded afterwards. The flattened index of plane
//! `(n, c)` is `n * C + c` (batch-major).

use burn::prelude::*;

use crate::error::{DeformError, DeformResult};

/// `[N, H, W, C]` → `[N * C, H, W]`.
pub fn to_planes<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch, height, width, channels] = x.dims();
    x.permute([0, 3, 1, 2])
        .reshape([batch * channels, height, width])
}

/// `[N * C, H, W, taps]` → `[N, H, W, taps, C]`.
///
/// Fails if the leading axis is not `batch * channels`.
pub fn from_planes<B: Backend>(
    x: Tensor<B, 4>,
    batch: usize,
    channels: usize,
) -> DeformResult<Tensor<B, 5>> {
    let [planes, height, width, taps] = x.dims();
    if planes != batch * channels {
        return Err(DeformError::shape_mismatch(
            "sampled planes (batch * channels)",
            batch * channels,
            planes,
        ));
    }

    Ok(x.reshape([batch, channels, height, width, taps])
        .permute([0, 2, 3, 4, 1]))
}
