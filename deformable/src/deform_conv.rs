//! # Deformable Convolution
//!
//! Deformable convolution (v1) in channel-last layout. Each output location samples its
//! `kh * kw` taps at positions shifted by a predicted offset field, then a 1x1
//! contraction over the `taps * in_channels` samples produces the output channels.
//!
//! Stride is fixed at one and padding is `SAME`-like: sampling positions are clipped to
//! the feature map, so the output keeps the input's spatial size.

use burn::{
    module::{Ignored, Param},
    prelude::*,
};
use burn_extra_ops::trunc_normal;

use crate::{
    error::{DeformError, DeformResult},
    grid::{GridBuilder, GridCache},
    layer::Layer,
    params::LayerParam,
    sampler::batch_map_offsets,
};

/// Configuration for the `DeformableConv2d` module.
#[derive(Config, Debug)]
pub struct DeformableConv2dConfig {
    /// `[in_channels, out_channels]`.
    pub channels: [usize; 2],
    /// `[kh, kw]` kernel footprint. Asymmetric kernels are allowed.
    #[config(default = "[3, 3]")]
    pub kernel_size: [usize; 2],
    /// Whether to include a bias term.
    #[config(default = "true")]
    pub bias: bool,
    /// Standard deviation of the truncated-normal weight initializer.
    #[config(default = "0.02")]
    pub weight_std: f64,
    /// Constant the bias is initialized to.
    #[config(default = "0.0")]
    pub bias_init: f64,
}

impl DeformableConv2dConfig {
    /// Checks that the configuration describes a buildable layer.
    pub fn validate(&self) -> DeformResult<()> {
        GridBuilder::new(self.kernel_size)?;
        if self.channels.contains(&0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!("channels must be non-zero, got {:?}", self.channels),
            });
        }
        if !(self.weight_std.is_finite() && self.weight_std >= 0.0) {
            return Err(DeformError::InvalidConfiguration {
                reason: format!("weight_std must be finite and >= 0, got {}", self.weight_std),
            });
        }
        Ok(())
    }

    /// Number of taps in the kernel footprint.
    pub const fn taps(&self) -> usize {
        self.kernel_size[0] * self.kernel_size[1]
    }

    /// Trailing dimension a compatible offset predictor must produce (`2 * kh * kw`).
    pub const fn offset_channels(&self) -> usize {
        2 * self.taps()
    }

    /// Initializes a new `DeformableConv2d` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DeformResult<DeformableConv2d<B>> {
        self.validate()?;
        let [in_channels, out_channels] = self.channels;

        let weight = trunc_normal(
            [self.taps(), in_channels, out_channels],
            0.0,
            self.weight_std,
            device,
        );
        let bias = self
            .bias
            .then(|| Param::from_tensor(Tensor::full([out_channels], self.bias_init, device)));

        Ok(DeformableConv2d {
            weight: Param::from_tensor(weight),
            bias,
            kernel_size: self.kernel_size,
            grids: Ignored(GridCache::new()),
        })
    }

    /// Builds a deformable layer on top of `layer`, steered by `offset_layer`.
    ///
    /// The offset layer must produce `[N, H, W, 2 * kh * kw]` for the same `N, H, W` as
    /// `layer`. The result carries `layer`'s parameters, then the offset layer's
    /// parameters that `layer` does not already have, then this layer's weight and bias.
    pub fn build<B, A>(
        &self,
        name: &str,
        layer: &Layer<B>,
        offset_layer: &Layer<B>,
        act: A,
    ) -> DeformResult<Layer<B>>
    where
        B: Backend,
        A: Fn(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        self.validate()?;
        if layer.channels() != self.channels[0] {
            return Err(DeformError::shape_mismatch(
                "input channels",
                self.channels[0],
                layer.channels(),
            ));
        }
        if offset_layer.channels() != self.offset_channels() {
            return Err(DeformError::shape_mismatch(
                "predicted offset channels (2 * kh * kw)",
                self.offset_channels(),
                offset_layer.channels(),
            ));
        }

        let conv = self.init::<B>(&layer.outputs().device())?;
        let outputs = conv.forward(
            layer.outputs().clone(),
            offset_layer.outputs().clone(),
            act,
        )?;
        let built = Layer::compose(
            &layer.absorb(offset_layer),
            name,
            outputs,
            conv.parameters(),
        );

        tracing::info!(
            layer = name,
            kernel_size = ?self.kernel_size,
            channels = ?self.channels,
            params = built.params().len(),
            "built deformable conv layer"
        );
        Ok(built)
    }
}

/// Deformable Convolution v1 layer over channel-last feature maps.
#[derive(Module, Debug)]
pub struct DeformableConv2d<B: Backend> {
    /// `[kh * kw, in_channels, out_channels]`: a 1x1 kernel over the flattened
    /// `taps * in_channels` axis.
    pub weight: Param<Tensor<B, 3>>,
    /// `[out_channels]`.
    pub bias: Option<Param<Tensor<B, 1>>>,
    pub kernel_size: [usize; 2],
    grids: Ignored<GridCache>,
}

impl<B: Backend> DeformableConv2d<B> {
    /// Applies the layer.
    ///
    /// # Shapes
    ///
    /// - input: `[N, H, W, in_channels]`
    /// - offset: `[N, H, W, 2 * kh * kw]`
    /// - output: `[N, H, W, out_channels]`
    pub fn forward<A>(
        &self,
        input: Tensor<B, 4>,
        offset: Tensor<B, 4>,
        act: A,
    ) -> DeformResult<Tensor<B, 4>>
    where
        A: Fn(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let [batch, height, width, channels] = input.dims();
        let [taps, in_channels, out_channels] = self.weight.dims();
        let [kh, kw] = self.kernel_size;
        if taps != kh * kw {
            return Err(DeformError::shape_mismatch(
                "weight taps (kh * kw)",
                kh * kw,
                taps,
            ));
        }
        if channels != in_channels {
            return Err(DeformError::shape_mismatch(
                "input channels",
                in_channels,
                channels,
            ));
        }

        let grid = self
            .grids
            .0
            .base_grid(self.kernel_size, [height, width])?
            .to_tensor(&input.device());
        let deformed = batch_map_offsets(input, offset, grid)?;

        let columns = deformed.reshape([batch * height * width, taps * in_channels]);
        let kernel = self.weight.val().reshape([taps * in_channels, out_channels]);
        let mut output = columns.matmul(kernel);
        if let Some(bias) = &self.bias {
            output = output + bias.val().unsqueeze::<2>();
        }

        Ok(act(output.reshape([batch, height, width, out_channels])))
    }

    /// The learnable tensors of this layer: weight, then bias if present.
    pub fn parameters(&self) -> Vec<LayerParam<B>> {
        let mut params = vec![LayerParam::from(self.weight.clone())];
        params.extend(self.bias.clone().map(LayerParam::from));
        params
    }

    /// `[in_channels, out_channels]`.
    pub fn channels(&self) -> [usize; 2] {
        let [_, in_channels, out_channels] = self.weight.dims();
        [in_channels, out_channels]
    }
}
