//! # Resize Layers
//!
//! Up- and down-sampling of channel-last feature maps, either by a scale factor or to
//! an absolute size. Resizing has no learnable state; the resulting layer carries its
//! predecessor's parameters and drop map unchanged.
//!
//! Bilinear and bicubic resampling align corners: the first and last input pixels land
//! exactly on the first and last output pixels, so doubling `[0, 10]` yields
//! `[0, 10/3, 20/3, 10]` rather than the half-pixel `[0, 5, 10, 10]`.

use burn::{
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::{
    error::{DeformError, DeformResult},
    layer::Layer,
};

/// Resampling filter.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ResizeMethod {
    /// Bilinear interpolation.
    Bilinear,
    /// Nearest-neighbour interpolation.
    Nearest,
    /// Bicubic interpolation.
    Bicubic,
}

impl ResizeMethod {
    fn mode(&self) -> InterpolateMode {
        match self {
            Self::Bilinear => InterpolateMode::Bilinear,
            Self::Nearest => InterpolateMode::Nearest,
            Self::Bicubic => InterpolateMode::Bicubic,
        }
    }
}

/// Configuration for up/down sampling a layer.
#[derive(Config, Debug)]
pub struct Resize2dConfig {
    /// `[height, width]` scale factors when `is_scale`, otherwise the target size in pixels.
    pub size: [f64; 2],
    /// Interpret `size` as scale factors.
    #[config(default = "true")]
    pub is_scale: bool,
    /// Resampling filter.
    #[config(default = "ResizeMethod::Bilinear")]
    pub method: ResizeMethod,
}

impl Resize2dConfig {
    /// Output `[H, W]` for an input of spatial size `input`.
    ///
    /// Scaled sizes are truncated towards zero.
    pub fn output_size(&self, input: [usize; 2]) -> DeformResult<[usize; 2]> {
        if self.size.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!("resize size must be finite and >= 0, got {:?}", self.size),
            });
        }

        let output = if self.is_scale {
            [
                (self.size[0] * input[0] as f64) as usize,
                (self.size[1] * input[1] as f64) as usize,
            ]
        } else {
            [self.size[0] as usize, self.size[1] as usize]
        };

        if output.contains(&0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!("resize of {input:?} by {:?} yields an empty map", self.size),
            });
        }
        Ok(output)
    }

    /// Resizes a `[N, H, W, C]` tensor.
    pub fn resize<B: Backend>(&self, x: Tensor<B, 4>) -> DeformResult<Tensor<B, 4>> {
        let [_, height, width, _] = x.dims();
        let output_size = self.output_size([height, width])?;

        let resized = interpolate(
            x.permute([0, 3, 1, 2]),
            output_size,
            InterpolateOptions::new(self.method.mode()),
        );
        Ok(resized.permute([0, 2, 3, 1]))
    }

    /// Builds a resized layer on top of `layer`.
    pub fn build<B: Backend>(&self, name: &str, layer: &Layer<B>) -> DeformResult<Layer<B>> {
        let outputs = self.resize(layer.outputs().clone())?;
        let [_, height, width, _] = outputs.dims();

        tracing::info!(
            layer = name,
            is_scale = self.is_scale,
            size = ?self.size,
            method = ?self.method,
            output = ?[height, width],
            "built resize layer"
        );
        Ok(Layer::compose(layer, name, outputs, core::iter::empty()))
    }
}
