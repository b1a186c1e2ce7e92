//! # Truncated Normal Initialization
//!
//! Samples a tensor from a normal distribution whose tails are cut at
//! [`TRUNCATION_STDDEVS`] standard deviations. Out-of-range samples are re-drawn rather
//! than clipped, so the result follows the truncated distribution instead of piling up
//! mass at the bounds.

use burn::{prelude::*, tensor::Distribution};

/// Samples further than this many standard deviations from the mean are re-drawn.
pub const TRUNCATION_STDDEVS: f64 = 2.0;

/// Number of re-draw rounds before the stragglers are clamped.
const MAX_REDRAWS: usize = 8;

/// Creates a tensor of the given shape filled from a truncated normal distribution.
///
/// # Arguments
///
/// * `shape` - The shape of the tensor to create.
/// * `mean` - The mean of the normal distribution.
/// * `std` - The standard deviation of the normal distribution.
/// * `device` - The device to allocate the tensor on.
pub fn trunc_normal<B: Backend, const D: usize>(
    shape: [usize; D],
    mean: f64,
    std: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let bound = TRUNCATION_STDDEVS * std;

    let mut x = Tensor::<B, D>::random(shape, Distribution::Normal(mean, std), device);
    for _ in 0..MAX_REDRAWS {
        let out_of_range = x.clone().sub_scalar(mean).abs().greater_elem(bound);
        let redraw = x.random_like(Distribution::Normal(mean, std));
        x = x.mask_where(out_of_range, redraw);
    }

    // After MAX_REDRAWS rounds a sample survives outside the bounds with
    // probability below 1e-10; clamp whatever is left.
    x.clamp(mean - bound, mean + bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn trunc_normal_stays_within_two_stddevs() {
        let device = Default::default();
        let std = 0.02;

        let x = trunc_normal::<TestBackend, 2>([64, 64], 0.0, std, &device);

        let values = x.into_data().to_vec::<f32>().unwrap();
        let bound = (TRUNCATION_STDDEVS * std) as f32 + 1e-6;
        assert!(values.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn trunc_normal_mean_is_close_to_requested() {
        let device = Default::default();

        let x = trunc_normal::<TestBackend, 1>([20_000], 1.0, 0.5, &device);

        let mean = x.mean().into_scalar();
        assert!((mean - 1.0).abs() < 0.02, "mean {mean} too far from 1.0");
    }

    #[test]
    fn trunc_normal_zero_std_is_constant() {
        let device = Default::default();

        let x = trunc_normal::<TestBackend, 3>([2, 3, 4], 0.25, 0.0, &device);

        assert_eq!(x.dims(), [2, 3, 4]);
        let values = x.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (*v - 0.25).abs() < 1e-7));
    }
}
