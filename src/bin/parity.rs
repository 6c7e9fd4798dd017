use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use piedense::parity::{ParityCase, ParityLimits, ParityOutcome};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "piedense-parity", version, about = "Compare the int8 dense kernels against the float reference on random layers")]
struct Args {
    /// Number of random layers
    #[arg(long, default_value_t = 1000)]
    trials: usize,

    /// Base seed; trial i uses seed + i
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Threads
    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, default_value_t = 4)]
    max_batches: usize,

    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    #[arg(long, default_value_t = 16)]
    max_output: usize,

    /// Allowed absolute difference in quantized units
    #[arg(long, default_value_t = 1)]
    tolerance: i32,

    /// Write a JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    trials: usize,
    seed: u64,
    limits: ParityLimits,
    tolerance: i32,
    max_abs_diff: i32,
    diff_histogram: [usize; 3],
    failures: Vec<(u64, &'a ParityOutcome)>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let limits = ParityLimits {
        max_batches: args.max_batches,
        max_depth: args.max_depth,
        max_output: args.max_output,
        ..ParityLimits::default()
    };

    let pb = ProgressBar::new(args.trials as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} trials ({eta})")?);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads.max(1)).build()?;
    let outcomes: Vec<(u64, ParityOutcome)> = pool.install(|| {
        (0..args.trials as u64)
            .into_par_iter()
            .map(|i| {
                let seed = args.seed.wrapping_add(i);
                let out = ParityCase::random(seed, &limits).and_then(|c| c.compare());
                pb.inc(1);
                out.map(|o| (seed, o))
            })
            .collect::<piedense::Result<Vec<_>>>()
    })?;
    pb.finish_and_clear();

    let mut hist = [0usize; 3];
    let mut max_abs_diff = 0;
    let mut failures = Vec::new();
    for (seed, o) in &outcomes {
        for (h, n) in hist.iter_mut().zip(o.diff_histogram) { *h += n; }
        max_abs_diff = max_abs_diff.max(o.max_abs_diff);
        if o.max_abs_diff > args.tolerance {
            warn!("seed {}: max diff {} ({}x{}x{})", seed, o.max_abs_diff, o.batches, o.accum_depth, o.output_depth);
            failures.push((*seed, o));
        }
    }
    println!(
        "trials={} max_abs_diff={} exact={} off_by_one={} worse={}",
        args.trials, max_abs_diff, hist[0], hist[1], hist[2]
    );

    let n_failures = failures.len();
    if let Some(path) = &args.report {
        let report = Report {
            trials: args.trials,
            seed: args.seed,
            limits,
            tolerance: args.tolerance,
            max_abs_diff,
            diff_histogram: hist,
            failures,
        };
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    if n_failures > 0 {
        bail!("{} of {} trials exceeded tolerance {}", n_failures, args.trials, args.tolerance);
    }
    Ok(())
}
