//! piv-average-subtract - remove the static background from a sequence.
//!
//! Computes the ensemble average of all input frames and writes each
//! frame minus that average next to the original as
//! `<name>.avg_sub.pnm`. Useful before correlation when reflections or
//! wall glare dominate the particle signal.

use anyhow::{Context, Result, bail};
use clap::Parser;
use piv_core::expr::{Expr, splat};
use piv_core::log::Level;
use piv_core::{GfImage, Gray, ImageLike};
use piv_io::LoaderRegistry;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "piv-average-subtract", version)]
#[command(about = "Subtract the ensemble-average background from particle images")]
struct Args {
    /// Input image files (two or more)
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    /// Also log per-file progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let code = match run(args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("piv-average-subtract: {err:#}");
            1
        }
    };

    piv_core::log::global().shutdown();
    std::process::exit(code);
}

fn run(args: Args) -> Result<()> {
    let threshold = if args.verbose { Level::Info } else { Level::Warn };
    piv_core::log::global().add_sink(move |level, line| {
        if level <= threshold {
            eprintln!("{line}");
        }
        true
    });
    piv_io::register_default_loaders();

    let mut images: Vec<GfImage> = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let mut file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut loader = LoaderRegistry::global()
            .find_for(&mut file)
            .with_context(|| format!("no loader recognises {}", path.display()))?;
        images.push(
            loader
                .load_gf(&mut file)
                .with_context(|| format!("failed to load {}", path.display()))?,
        );
    }

    let size = images[0].size();
    for (i, im) in images.iter().enumerate() {
        if im.size() != size {
            bail!(
                "image size mismatch: {} is {}, expected {}",
                args.inputs[i].display(),
                im.size(),
                size
            );
        }
    }

    let mut average = GfImage::with_size(size);
    for im in &images {
        average = (average.expr() + im.expr()).eval();
    }
    average = (average.expr() / splat(Gray(images.len() as f64))).eval();

    let writer = LoaderRegistry::global().find_by_name("image/x-portable-anymap")?;
    for (path, im) in args.inputs.iter().zip(&images) {
        let subtracted = (im.expr() - average.expr()).eval();

        let out_path = PathBuf::from(format!("{}.avg_sub.pnm", path.display()));
        let mut out = BufWriter::new(
            File::create(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?,
        );
        writer.save_gf(&mut out, &subtracted)?;
        piv_core::log_info!("wrote {}", out_path.display());
    }

    Ok(())
}
