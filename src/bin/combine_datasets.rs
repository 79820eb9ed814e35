//! combine_datasets - merge two labeled image datasets into one directory

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use sightings::dataset::{combine_datasets, DEFAULT_SECOND_PREFIX};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to first dataset directory.
    #[arg(long)]
    dataset1: PathBuf,
    /// Path to second dataset directory.
    #[arg(long)]
    dataset2: PathBuf,
    /// Output directory for combined dataset.
    #[arg(long)]
    output: PathBuf,
    /// Prefix added to second dataset filenames.
    #[arg(long, default_value = DEFAULT_SECOND_PREFIX)]
    prefix: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let summary = combine_datasets(&args.dataset1, &args.dataset2, &args.output, &args.prefix)?;

    println!("combine_datasets summary:");
    println!("  total images: {}", summary.total_images());
    println!("  total labels: {}", summary.total_labels());
    println!("  classes: {}", summary.classes.len());
    println!("  combined dataset: {}", args.output.display());
    Ok(())
}
