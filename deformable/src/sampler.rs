//! # Bilinear Sampling
//!
//! Batched bilinear interpolation of single-channel planes at fractional coordinates.
//!
//! For a coordinate `(r, q)` the four integer corners are
//!
//! | corner | row        | col        |
//! |--------|------------|------------|
//! | `lt`   | `floor(r)` | `floor(q)` |
//! | `rb`   | `ceil(r)`  | `ceil(q)`  |
//! | `lb`   | `floor(r)` | `ceil(q)`  |
//! | `rt`   | `ceil(r)`  | `floor(q)` |
//!
//! and, with `(fr, fq) = (r, q) - lt`, the blend is
//!
//! ```text
//! top    = v_lt + (v_rt - v_lt) * fr
//! bottom = v_lb + (v_rb - v_lb) * fr
//! value  = top  + (bottom - top) * fq
//! ```
//!
//! Rows are interpolated first, then columns. On an integral axis `floor == ceil` and the
//! fraction is zero, so integral coordinates read the feature value exactly.
//!
//! Every corner is fetched by a flat gather over the whole `[N, H, W]` tensor, which
//! materializes four index and four value tensors of `N * H * W * taps` elements. Memory
//! grows with the kernel footprint, so this suits moderate feature-map sizes.

use burn::prelude::*;
use burn_extra_ops::TensorExtraOps;

use crate::{
    coords::resolve_coordinates,
    error::{DeformError, DeformResult},
    layout::{from_planes, to_planes},
};

/// Samples `[N, H, W]` planes at `[N, H, W, taps, 2]` coordinates, returning `[N, H, W, taps]`.
///
/// Coordinates must already lie inside the planes (see
/// [`clip_coordinates`](crate::coords::clip_coordinates)).
pub fn batch_map_coordinates<B: Backend>(
    inputs: Tensor<B, 3>,
    coords: Tensor<B, 5>,
) -> DeformResult<Tensor<B, 4>> {
    let [planes, height, width] = inputs.dims();
    let [coord_planes, coord_h, coord_w, taps, pair] = coords.dims();
    if [coord_planes, coord_h, coord_w, pair] != [planes, height, width, 2] {
        return Err(DeformError::shape_mismatch(
            "sampling coordinates",
            [planes, height, width, taps, 2],
            [coord_planes, coord_h, coord_w, taps, pair],
        ));
    }

    let device = inputs.device();
    let n_coords = height * width * taps;
    let flat = inputs.reshape([planes * height * width]);

    // Start of each coordinate's plane inside the flattened tensor.
    let plane_start = Tensor::<B, 1, Int>::arange(0..planes as i64, &device)
        .repeat_elements(n_coords)
        .mul_scalar((height * width) as i64);

    let coords_lt = coords.clone().floor();
    let coords_rb = coords.clone().ceil();
    let frac = coords - coords_lt.clone();

    let (row_lt, col_lt) = split_axes(coords_lt.int());
    let (row_rb, col_rb) = split_axes(coords_rb.int());
    let (frac_row, frac_col) = split_axes(frac);

    let corner = |row: &Tensor<B, 1, Int>, col: &Tensor<B, 1, Int>| {
        let index = plane_start.clone() + row.clone().mul_scalar(width as i64) + col.clone();
        flat.clone().gather(0, index)
    };
    let vals_lt = corner(&row_lt, &col_lt);
    let vals_rb = corner(&row_rb, &col_rb);
    let vals_lb = corner(&row_lt, &col_rb);
    let vals_rt = corner(&row_rb, &col_lt);

    let vals_top = vals_lt.clone() + (vals_rt - vals_lt) * frac_row.clone();
    let vals_bottom = vals_lb.clone() + (vals_rb - vals_lb) * frac_row;
    let mapped = vals_top.clone() + (vals_bottom - vals_top) * frac_col;

    Ok(mapped.reshape([planes, height, width, taps]))
}

/// Deforms a channel-last feature map with a predicted offset field.
///
/// * `inputs` - `[N, H, W, C]` feature map.
/// * `offsets` - `[N, H, W, 2 * taps]` predicted offsets.
/// * `base_grid` - `[H, W, taps, 2]` grid from [`GridBuilder`](crate::grid::GridBuilder).
///
/// Returns the sampled taps as `[N, H, W, taps, C]`.
pub fn batch_map_offsets<B: Backend>(
    inputs: Tensor<B, 4>,
    offsets: Tensor<B, 4>,
    base_grid: Tensor<B, 4>,
) -> DeformResult<Tensor<B, 5>> {
    let [batch, height, width, channels] = inputs.dims();
    let [grid_h, grid_w, _, _] = base_grid.dims();
    if [grid_h, grid_w] != [height, width] {
        return Err(DeformError::shape_mismatch(
            "base grid spatial size",
            [height, width],
            [grid_h, grid_w],
        ));
    }
    let [offset_batch, ..] = offsets.dims();
    if offset_batch != batch {
        return Err(DeformError::shape_mismatch(
            "predicted offset batch size",
            batch,
            offset_batch,
        ));
    }

    let coords = resolve_coordinates(base_grid, offsets, channels)?;
    let mapped = batch_map_coordinates(to_planes(inputs), coords)?;
    from_planes(mapped, batch, channels)
}

/// Splits `[N, H, W, taps, 2]` into flattened row and column components.
fn split_axes<B: Backend, K: burn::tensor::BasicOps<B>>(
    coords: Tensor<B, 5, K>,
) -> (Tensor<B, 1, K>, Tensor<B, 1, K>) {
    let rows = coords.clone().narrow(4, 0, 1).flatten::<1>(0, 4);
    let cols = coords.narrow(4, 1, 1).flatten::<1>(0, 4);
    (rows, cols)
}
