use anyhow::Result;
use clap::Parser;
use log::info;
use piedense::layer::config::DenseLayerConfig;
use piedense::quant::saturate_i8;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "piedense-create-layer", version, about = "Write a random quantized dense layer file (PIEFC001)")]
struct Args {
    /// JSON layer config (dims, quantization, output stage)
    #[arg(long)]
    config: PathBuf,

    /// Output layer file
    #[arg(long)]
    out: PathBuf,

    /// RNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Std-dev of the int8 weights before rounding
    #[arg(long, default_value_t = 32.0)]
    weight_std: f32,

    /// Std-dev of the int32 bias values
    #[arg(long, default_value_t = 256.0)]
    bias_std: f32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let cfg = DenseLayerConfig::load(&args.config)?;
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let w_dist = Normal::new(0.0f32, args.weight_std.max(f32::MIN_POSITIVE))?;
    let filter: Vec<i8> = (0..cfg.input_dim * cfg.output_dim)
        .map(|_| saturate_i8(w_dist.sample(&mut rng).round() as i32))
        .collect();
    let bias = if cfg.use_bias {
        let b_dist = Normal::new(0.0f32, args.bias_std.max(f32::MIN_POSITIVE))?;
        Some((0..cfg.output_dim).map(|_| b_dist.sample(&mut rng).round() as i32).collect())
    } else {
        None
    };

    let layer = cfg.build(filter, bias)?;
    info!("output stage: {:?}", layer.stage);
    layer.write_quantized(&args.out)?;
    println!(
        "wrote {} ({}x{}, bias={}, multiplier={}, shift={})",
        args.out.display(),
        layer.meta.input_dim,
        layer.meta.output_dim,
        layer.bias.is_some(),
        layer.stage.output_multiplier,
        layer.stage.output_shift
    );
    Ok(())
}
