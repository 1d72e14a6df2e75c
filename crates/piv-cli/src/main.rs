//! piv - FFT cross-correlation PIV over image pairs.
//!
//! Takes a sequence of particle images, forms consecutive pairs, and
//! writes one tab-separated vector file per pair.

use anyhow::{Context, Result, bail};
use clap::Parser;
use piv_core::log::Level;
use piv_core::{Size, is_pow2};
use piv_process::{Batch, BatchConfig, BatchSummary, ImagePair};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "piv", version)]
#[command(about = "Compute displacement fields from particle image pairs")]
#[command(long_about = "
Compute two-dimensional displacement fields from particle-seeded image
pairs by FFT cross-correlation.

Consecutive input files form pairs: frame_0 with frame_1, frame_1 with
frame_2, and so on. Each pair produces one tab-separated vector file
(x, y, u, v, snr, ...) named after the pair's first frame.

Examples:
  piv frame_000.pgm frame_001.pgm
  piv --size 64 --overlap 0.25 run/*.tif --output-dir vectors/
")]
struct Args {
    /// Input image files; consecutive files form pairs
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    /// Interrogation window edge in pixels (power of two, >= 4)
    #[arg(short, long, default_value_t = 32)]
    size: u32,

    /// Fractional window overlap in [0, 1)
    #[arg(short, long, default_value_t = 0.5)]
    overlap: f64,

    /// Correlator thread count (default: cores - 1)
    #[arg(short, long)]
    thread_count: Option<usize>,

    /// Directory receiving one vector file per pair
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Release results in pair order instead of completion order
    #[arg(long)]
    ordered: bool,

    /// Also log per-pair progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let code = match run(args) {
        Ok(summary) => {
            println!(
                "processed {} pair(s), {} skipped",
                summary.pairs_done, summary.pairs_failed
            );
            0
        }
        Err(err) => {
            eprintln!("piv: {err:#}");
            1
        }
    };

    // the logger goes down last so shutdown of everything else can log
    piv_core::log::global().shutdown();
    std::process::exit(code);
}

fn run(args: Args) -> Result<BatchSummary> {
    // logger before anything that may log, loaders right after
    let threshold = if args.verbose { Level::Info } else { Level::Warn };
    piv_core::log::global().add_sink(move |level, line| {
        if level <= threshold {
            eprintln!("{line}");
        }
        true
    });
    piv_io::register_default_loaders();

    if !is_pow2(u64::from(args.size)) || args.size < 4 {
        bail!("interrogation size {} must be a power of two >= 4", args.size);
    }
    if !(0.0..1.0).contains(&args.overlap) {
        bail!("overlap {} must lie in [0, 1)", args.overlap);
    }

    for path in &args.inputs {
        if !path.is_file() {
            bail!("input {} is not a readable file", path.display());
        }
    }

    let pairs: Vec<ImagePair> = args
        .inputs
        .windows(2)
        .map(|w| ImagePair {
            a: w[0].clone(),
            b: w[1].clone(),
        })
        .collect();

    let config = BatchConfig {
        interrogation: Size::new(args.size, args.size),
        overlap: args.overlap,
        threads: args.thread_count.unwrap_or_else(BatchConfig::default_threads),
        ordered: args.ordered,
        output_dir: args.output_dir,
    };

    Batch::run(config, pairs).context("batch failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["piv", "a.pgm", "b.pgm"]);
        assert_eq!(args.size, 32);
        assert_eq!(args.overlap, 0.5);
        assert!(args.thread_count.is_none());
        assert!(!args.ordered);
    }

    #[test]
    fn test_requires_two_inputs() {
        assert!(Args::try_parse_from(["piv", "only.pgm"]).is_err());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let args = Args::parse_from(["piv", "--size", "33", "a.pgm", "b.pgm"]);
        assert!(run(args).is_err());

        let args = Args::parse_from(["piv", "--overlap", "1.5", "a.pgm", "b.pgm"]);
        assert!(run(args).is_err());
    }
}
