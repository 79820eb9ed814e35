//! annotate_image - run the detector once over a still image

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use sightings::{annotate_image, registry_from_config, AnnotationRenderer, DetectionAdapter};
use sightings::SightingsConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image (jpg, jpeg, png, bmp, tiff, webp).
    input: PathBuf,
    /// Output directory (overrides config).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Detector backend (stub|tract).
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model path for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// classes.txt with one label per line.
    #[arg(long)]
    labels: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SightingsConfig::load()?;
    if let Some(out) = args.out {
        cfg.output_dir = out;
    }
    if let Some(backend) = args.backend {
        cfg.detector.backend = backend;
    }
    if let Some(model) = args.model {
        cfg.detector.model_path = model;
    }
    if let Some(labels) = args.labels {
        cfg.detector.labels_path = labels;
    }

    let registry = registry_from_config(&cfg.detector)?;
    let backend = registry.select(None)?;
    let mut detector = backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    let mut adapter = DetectionAdapter::new(&mut *detector)
        .with_min_confidence(cfg.detector.confidence_threshold);

    let report = annotate_image(
        &args.input,
        &cfg.output_dir,
        &mut adapter,
        &AnnotationRenderer::default(),
    )?;

    println!("annotate_image summary:");
    println!("  output: {}", report.output_path.display());
    for detection in &report.detections {
        println!(
            "  {} {:.2} [{:.0}, {:.0}, {:.0}, {:.0}]",
            detection.label,
            detection.confidence,
            detection.region.x_min,
            detection.region.y_min,
            detection.region.x_max,
            detection.region.y_max
        );
    }
    Ok(())
}
