//! # Coordinate Resolution
//!
//! Turns the static base grid and a predicted offset field into absolute sampling
//! coordinates:
//!
//! 1. `coords = base_grid + offsets`, broadcast over the batch. NaN offsets count as
//!    zero, so a diverged predictor samples the undeformed kernel window.
//! 2. Rows are clipped to `[0, H - 1]` and columns to `[0, W - 1]`, each axis on its own.
//! 3. The clipped field is shared by every channel of its batch element, producing one
//!    coordinate field per `(n, c)` plane in the batch-major order of
//!    [`to_planes`](crate::layout::to_planes).

use burn::prelude::*;

use crate::error::{DeformError, DeformResult};

/// Resolves `[N, H, W, 2 * taps]` predicted offsets against a `[H, W, taps, 2]` base grid.
///
/// Returns `[N * channels, H, W, taps, 2]` coordinates inside the feature map.
pub fn resolve_coordinates<B: Backend>(
    base_grid: Tensor<B, 4>,
    offsets: Tensor<B, 4>,
    channels: usize,
) -> DeformResult<Tensor<B, 5>> {
    let [height, width, taps, pair] = base_grid.dims();
    if pair != 2 {
        return Err(DeformError::shape_mismatch("base grid trailing axis", 2, pair));
    }
    if height == 0 || width == 0 {
        return Err(DeformError::shape_mismatch(
            "feature map spatial size",
            "non-empty [H, W]",
            [height, width],
        ));
    }

    let [batch, offset_h, offset_w, offset_c] = offsets.dims();
    if offset_c != 2 * taps {
        return Err(DeformError::shape_mismatch(
            "predicted offset channels (2 * taps)",
            2 * taps,
            offset_c,
        ));
    }
    if [offset_h, offset_w] != [height, width] {
        return Err(DeformError::shape_mismatch(
            "predicted offset spatial size",
            [height, width],
            [offset_h, offset_w],
        ));
    }

    let offsets = offsets
        .clone()
        .mask_fill(offsets.is_nan(), 0.0)
        .reshape([batch, height, width, taps, 2]);
    let coords = base_grid.unsqueeze::<5>().repeat_dim(0, batch) + offsets;
    let coords = clip_coordinates(coords, [height, width]);

    Ok(tile_channels(coords, channels))
}

/// Clips rows to `[0, H - 1]` and columns to `[0, W - 1]` independently.
pub fn clip_coordinates<B: Backend>(coords: Tensor<B, 5>, size: [usize; 2]) -> Tensor<B, 5> {
    let [height, width] = size;
    let rows = coords
        .clone()
        .narrow(4, 0, 1)
        .clamp(0.0, height.saturating_sub(1) as f64);
    let cols = coords
        .narrow(4, 1, 1)
        .clamp(0.0, width.saturating_sub(1) as f64);
    Tensor::cat(vec![rows, cols], 4)
}

/// `[N, H, W, taps, 2]` → `[N * channels, H, W, taps, 2]`, plane `n * channels + c`
/// carrying batch element `n`'s field.
pub fn tile_channels<B: Backend>(coords: Tensor<B, 5>, channels: usize) -> Tensor<B, 5> {
    let [batch, height, width, taps, pair] = coords.dims();
    coords
        .unsqueeze_dim::<6>(1)
        .repeat_dim(1, channels)
        .reshape([batch * channels, height, width, taps, pair])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBuilder;
    use burn::{
        backend::NdArray,
        tensor::{ops::FloatElem, Distribution, TensorData, Tolerance},
    };

    type TestBackend = NdArray;
    type FT = FloatElem<TestBackend>;

    fn base_grid(kernel: [usize; 2], size: [usize; 2]) -> Tensor<TestBackend, 4> {
        GridBuilder::new(kernel)
            .unwrap()
            .base_grid(size)
            .to_tensor(&Default::default())
    }

    #[test]
    fn zero_offsets_yield_clipped_base_grid() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 18], &device);

        let coords = resolve_coordinates(base_grid([3, 3], [2, 2]), offsets, 1).unwrap();

        assert_eq!(coords.dims(), [1, 2, 2, 9, 2]);
        let expected = clip_coordinates(base_grid([3, 3], [2, 2]).unsqueeze::<5>(), [2, 2]);
        coords
            .into_data()
            .assert_approx_eq::<FT>(&expected.into_data(), Tolerance::default());
    }

    #[test]
    fn clipping_is_per_axis() {
        let device = Default::default();
        let coords = Tensor::<TestBackend, 5>::from_data(
            TensorData::from([[[[[-3.0, 7.5], [2.5, -0.5], [9.0, 9.0]]]]]),
            &device,
        );

        let clipped = clip_coordinates(coords, [3, 8]);

        clipped.into_data().assert_approx_eq::<FT>(
            &TensorData::from([[[[[0.0, 7.0], [2.0, 0.0], [2.0, 7.0]]]]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn large_offsets_stay_within_bounds() {
        let device = Default::default();
        let (height, width) = (3, 6);
        let offsets = Tensor::<TestBackend, 4>::random(
            [2, height, width, 18],
            Distribution::Normal(0.0, 100.0),
            &device,
        );

        let coords =
            resolve_coordinates(base_grid([3, 3], [height, width]), offsets, 2).unwrap();

        let rows = coords.clone().narrow(4, 0, 1).into_data().to_vec::<f32>().unwrap();
        let cols = coords.narrow(4, 1, 1).into_data().to_vec::<f32>().unwrap();
        assert!(rows.iter().all(|r| (0.0..=(height - 1) as f32).contains(r)));
        assert!(cols.iter().all(|c| (0.0..=(width - 1) as f32).contains(c)));
    }

    #[test]
    fn channels_share_their_batch_elements_field() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 4>::random(
            [2, 3, 3, 18],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let coords = resolve_coordinates(base_grid([3, 3], [3, 3]), offsets, 3).unwrap();

        assert_eq!(coords.dims(), [6, 3, 3, 9, 2]);
        for n in 0..2 {
            let reference = coords.clone().narrow(0, n * 3, 1).into_data();
            for c in 1..3 {
                coords
                    .clone()
                    .narrow(0, n * 3 + c, 1)
                    .into_data()
                    .assert_approx_eq::<FT>(&reference, Tolerance::default());
            }
        }
    }

    #[test]
    fn offset_channel_count_must_be_twice_the_taps() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 4>::zeros([1, 4, 4, 16], &device);

        let result = resolve_coordinates(base_grid([3, 3], [4, 4]), offsets, 1);

        match result {
            Err(DeformError::ShapeMismatch {
                what,
                expected,
                actual,
            }) => {
                assert!(what.contains("offset channels"));
                assert_eq!(expected, "18");
                assert_eq!(actual, "16");
            }
            other => panic!("Expected ShapeMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn nan_offsets_fall_back_to_the_base_grid() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 4>::full([2, 3, 4, 18], f32::NAN, &device);

        let coords = resolve_coordinates(base_grid([3, 3], [3, 4]), offsets, 2).unwrap();

        let zeros = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 18], &device);
        let expected = resolve_coordinates(base_grid([3, 3], [3, 4]), zeros, 2).unwrap();
        coords
            .into_data()
            .assert_approx_eq::<FT>(&expected.into_data(), Tolerance::default());
    }

    #[test]
    fn offset_spatial_size_must_match_grid() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 4>::zeros([1, 4, 5, 18], &device);

        let result = resolve_coordinates(base_grid([3, 3], [4, 4]), offsets, 1);

        assert!(matches!(result, Err(DeformError::ShapeMismatch { .. })));
    }
}
