//! # Deformable Convolution for Burn
//!
//! A deformable convolution pipeline over channel-last (`[N, H, W, C]`) feature maps:
//!
//! - [`grid`]: static base sampling grids and centred kernel offsets.
//! - [`coords`]: base grid + predicted offsets → clipped absolute coordinates.
//! - [`sampler`]: batched bilinear sampling at fractional coordinates.
//! - [`layout`]: folding channels into the batch axis and back.
//! - [`DeformableConv2d`]: the 1x1 contraction over sampled taps, with weight and bias.
//!
//! Layers are chained through [`Layer`], which accumulates a deduplicated
//! [`ParameterSet`] and a [`DropMap`] along the way.

pub mod coords;
mod deform_conv;
pub mod error;
pub mod grid;
mod layer;
pub mod layout;
mod offset;
mod params;
mod resize;
pub mod sampler;

#[cfg(test)]
mod tests;

pub use deform_conv::{DeformableConv2d, DeformableConv2dConfig};
pub use error::{DeformError, DeformResult};
pub use grid::{GridBuilder, GridCache, SamplingGrid};
pub use layer::{identity, DropMap, Layer};
pub use offset::{OffsetConv2d, OffsetConv2dConfig};
pub use params::{LayerParam, ParameterSet};
pub use resize::{Resize2dConfig, ResizeMethod};
