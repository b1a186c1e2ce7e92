//! Deformable Convolution Demo
//!
//! Builds a small stack of offset-predictor + deformable convolution stages on random
//! input, followed by a resize, and logs every stage.
//!
//! ## Usage
//!
//! ```bash
//! # Two deformable stages with 16 and 32 filters on a 2x8x8x3 input
//! cargo run --bin deform -- --batch 2 --size 8 --channels 3 --filters 16 32
//!
//! # A 5x3 kernel, upsampled by 4 with nearest-neighbour resampling
//! cargo run --bin deform -- --kernel 5 3 --scale 4 --method nearest
//!
//! # More detail, including grid cache misses
//! RUST_LOG=debug cargo run --bin deform
//! ```

use anyhow::{bail, ensure, Context, Result};
use burn::{
    prelude::*,
    tensor::{activation::relu, Distribution},
};
use clap::{Parser, ValueEnum};
use deformable_burn::{
    DeformableConv2dConfig, Layer, OffsetConv2dConfig, Resize2dConfig, ResizeMethod,
};
use tracing_subscriber::EnvFilter;

cfg_if::cfg_if! {
    if #[cfg(feature = "wgpu")] {
        type SelectedBackend = burn::backend::Wgpu;
        const BACKEND_NAME: &str = "wgpu";
    } else {
        type SelectedBackend = burn::backend::NdArray;
        const BACKEND_NAME: &str = "ndarray";
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Batch size of the random input
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Height and width of the random input
    #[arg(long, default_value = "8")]
    size: usize,

    /// Channels of the random input
    #[arg(long, default_value = "3")]
    channels: usize,

    /// Output channels of each deformable stage
    #[arg(long, num_args = 1.., default_values_t = [16, 32])]
    filters: Vec<usize>,

    /// Kernel height and width (a single value is used for both)
    #[arg(long, num_args = 1..=2, default_values_t = [3])]
    kernel: Vec<usize>,

    /// Scale factor of the final resize
    #[arg(long, default_value = "2.0")]
    scale: f64,

    /// Resampling filter of the final resize
    #[arg(long, value_enum, default_value = "bilinear")]
    method: Method,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Bilinear,
    Nearest,
    Bicubic,
}

impl From<Method> for ResizeMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Bilinear => Self::Bilinear,
            Method::Nearest => Self::Nearest,
            Method::Bicubic => Self::Bicubic,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let kernel_size = match args.kernel[..] {
        [k] => [k, k],
        [kh, kw] => [kh, kw],
        ref other => bail!("--kernel takes one or two values, got {other:?}"),
    };
    ensure!(
        kernel_size.iter().all(|k| k % 2 == 1),
        "the convolutional offset predictor needs an odd kernel, got {kernel_size:?}"
    );

    let device = Default::default();
    tracing::info!(backend = BACKEND_NAME, "starting deformable convolution demo");

    let input = Tensor::<SelectedBackend, 4>::random(
        [args.batch, args.size, args.size, args.channels],
        Distribution::Normal(0.0, 1.0),
        &device,
    );
    let mut network = Layer::input("input", input);

    for (stage, &filters) in args.filters.iter().enumerate() {
        let offsets = OffsetConv2dConfig::new(network.channels())
            .with_kernel_size(kernel_size)
            .build(&format!("offset_{stage}"), &network)
            .with_context(|| format!("building offset predictor {stage}"))?;
        network = DeformableConv2dConfig::new([network.channels(), filters])
            .with_kernel_size(kernel_size)
            .build(&format!("deformable_{stage}"), &network, &offsets, relu)
            .with_context(|| format!("building deformable stage {stage}"))?;
    }

    let network = Resize2dConfig::new([args.scale, args.scale])
        .with_method(args.method.into())
        .build("resize", &network)
        .context("building resize layer")?;

    tracing::info!(
        output = ?network.dims(),
        params = network.params().len(),
        elements = network.params().num_elements(),
        "network built"
    );
    for (index, param) in network.params().iter().enumerate() {
        tracing::info!(index, dims = ?param.dims(), "parameter");
    }

    Ok(())
}
