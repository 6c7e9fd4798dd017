use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use piedense::layer::QuantDenseLayer;
use piedense::tensor::{PagedStore, Tensor};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "piedense-run-layer", version, about = "Apply a quantized dense layer file to int8 input rows")]
struct Args {
    /// Dense layer file (PIEFC001)
    #[arg(long)]
    layer: PathBuf,

    /// JSON array of input rows, each `input_dim` int8 values
    #[arg(long)]
    inputs: PathBuf,

    /// Use the float reference path instead of the integer kernel
    #[arg(long, default_value_t = false)]
    reference: bool,

    /// Page input and output tensors through files in this directory
    #[arg(long)]
    page_dir: Option<PathBuf>,

    /// Elements cached in RAM per paged tensor
    #[arg(long, default_value_t = 64)]
    cache_capacity: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let layer = QuantDenseLayer::load_quantized(&args.layer)?;
    let text = std::fs::read_to_string(&args.inputs)
        .with_context(|| format!("read inputs: {}", args.inputs.display()))?;
    let rows: Vec<Vec<i8>> = serde_json::from_str(&text).context("parse input rows")?;
    if rows.is_empty() { bail!("no input rows"); }
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != layer.meta.input_dim) {
        bail!("row {} has {} values, layer expects {}", i, r.len(), layer.meta.input_dim);
    }
    let batches = rows.len();
    let flat: Vec<i8> = rows.into_iter().flatten().collect();

    let t0 = Instant::now();
    let out = match (&args.page_dir, args.reference) {
        (Some(dir), false) => {
            std::fs::create_dir_all(dir).with_context(|| format!("create page dir: {}", dir.display()))?;
            let store = PagedStore::from_slice(dir.join("input.page"), &flat, args.cache_capacity)?;
            let input = Tensor::with_store(&[batches, layer.meta.input_dim], layer.input_params.clone(), Box::new(store))?;
            let mut out = Tensor::<i8>::paged(
                &[batches, layer.meta.output_dim],
                layer.output_params.clone(),
                dir.join("output.page"),
                args.cache_capacity,
            )?;
            layer.forward_into(&input, &mut out)?;
            out
        }
        (Some(_), true) => bail!("--page-dir is only supported for the integer kernel"),
        (None, reference) => {
            let input = layer.input_tensor(flat)?;
            if reference { layer.forward_reference(&input)? } else { layer.forward(&input)? }
        }
    };
    info!("forward: {} rows in {:.3}ms", batches, t0.elapsed().as_secs_f64() * 1e3);

    let values = out.to_vec()?;
    let rows_out: Vec<&[i8]> = values.chunks(layer.meta.output_dim).collect();
    println!("{}", serde_json::to_string(&rows_out)?);
    Ok(())
}
