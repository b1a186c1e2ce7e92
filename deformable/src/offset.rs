//! # Offset Prediction
//!
//! A convenience offset predictor: a `SAME`-padded, stride-1 convolution emitting the
//! `2 * kh * kw` channels a [`DeformableConv2dConfig`](crate::DeformableConv2dConfig)
//! with the same footprint expects. Weights and bias start at zero, so a freshly built
//! deformable layer samples the regular grid until training moves the offsets.
//!
//! Any other layer with the right trailing dimension works as an offset layer too.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};

use crate::{
    error::{DeformError, DeformResult},
    grid::GridBuilder,
    layer::Layer,
    params::LayerParam,
};

/// Configuration for the `OffsetConv2d` module.
#[derive(Config, Debug)]
pub struct OffsetConv2dConfig {
    /// Channels of the layer the offsets are predicted from.
    pub in_channels: usize,
    /// Footprint of the deformable kernel the offsets are for. Must be odd on both axes.
    #[config(default = "[3, 3]")]
    pub kernel_size: [usize; 2],
    /// Start from all-zero weights and bias.
    #[config(default = "true")]
    pub zero_init: bool,
}

impl OffsetConv2dConfig {
    /// `2 * kh * kw`.
    pub const fn out_channels(&self) -> usize {
        2 * self.kernel_size[0] * self.kernel_size[1]
    }

    /// Initializes a new `OffsetConv2d` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DeformResult<OffsetConv2d<B>> {
        GridBuilder::new(self.kernel_size)?;
        if self.in_channels == 0 {
            return Err(DeformError::InvalidConfiguration {
                reason: "offset predictor needs at least one input channel".to_owned(),
            });
        }
        if self.kernel_size.iter().any(|k| k % 2 == 0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!(
                    "SAME padding needs an odd kernel size, got {:?}",
                    self.kernel_size
                ),
            });
        }

        let mut conv =
            Conv2dConfig::new([self.in_channels, self.out_channels()], self.kernel_size)
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        if self.zero_init {
            conv.weight = Param::from_tensor(conv.weight.val().zeros_like());
            conv.bias = conv
                .bias
                .map(|bias| Param::from_tensor(bias.val().zeros_like()));
        }

        Ok(OffsetConv2d { conv })
    }

    /// Builds an offset layer on top of `layer`.
    pub fn build<B: Backend>(&self, name: &str, layer: &Layer<B>) -> DeformResult<Layer<B>> {
        if layer.channels() != self.in_channels {
            return Err(DeformError::shape_mismatch(
                "offset predictor input channels",
                self.in_channels,
                layer.channels(),
            ));
        }

        let predictor = self.init::<B>(&layer.outputs().device())?;
        let outputs = predictor.forward(layer.outputs().clone());
        let built = Layer::compose(layer, name, outputs, predictor.parameters());

        tracing::info!(
            layer = name,
            kernel_size = ?self.kernel_size,
            out_channels = self.out_channels(),
            params = built.params().len(),
            "built offset predictor layer"
        );
        Ok(built)
    }
}

/// Convolutional offset predictor over channel-last feature maps.
#[derive(Module, Debug)]
pub struct OffsetConv2d<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> OffsetConv2d<B> {
    /// `[N, H, W, C]` → `[N, H, W, 2 * kh * kw]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv
            .forward(x.permute([0, 3, 1, 2]))
            .permute([0, 2, 3, 1])
    }

    /// Weight, then bias if present.
    pub fn parameters(&self) -> Vec<LayerParam<B>> {
        let mut params = vec![LayerParam::from(self.conv.weight.clone())];
        params.extend(self.conv.bias.clone().map(LayerParam::from));
        params
    }
}
