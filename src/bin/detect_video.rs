//! detect_video - run the detector over a video and name the output by what it saw
//!
//! The output is written as `<name>_detecting.<ext>` and renamed once the run
//! completes. Ctrl-C stops early; what was processed so far is still finalized
//! and renamed.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sightings::ui::Ui;
use sightings::{
    registry_from_config, AnnotationRenderer, CancelToken, DetectionAdapter, EncoderKind,
    FileMedia, OutputSettings, Pipeline, SightingsConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video (avi, mov, mp4), or stub://<name>.<ext> for a synthetic clip.
    input: String,
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
    /// Output encoder (ffmpeg|rawvideo).
    #[arg(long)]
    encoder: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
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
    if let Some(encoder) = args.encoder.as_deref() {
        cfg.output.encoder = EncoderKind::parse(encoder)?;
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(args.ui.as_str()), is_tty, !stdout_is_tty);

    let registry = {
        let _stage = ui.stage("load detector");
        registry_from_config(&cfg.detector)?
    };
    let backend = registry.select(None)?;
    let mut detector = backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    detector.warm_up()?;

    let cancel = CancelToken::new();
    let stop = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("stop requested; finishing current frame");
        stop.cancel();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut media = FileMedia {
        synthetic_frames: cfg.synthetic_frames,
    };
    let mut progress = ui.frame_progress();
    let adapter = DetectionAdapter::new(&mut *detector)
        .with_min_confidence(cfg.detector.confidence_threshold);
    let mut pipeline = Pipeline::new(&mut media, adapter, cancel)
        .with_renderer(AnnotationRenderer::new(cfg.output.width, cfg.output.height))
        .with_output(OutputSettings {
            fps: cfg.output.fps,
            encoder: cfg.output.encoder,
        })
        .with_observer(&mut progress);

    let report = pipeline.run(&args.input, &cfg.output_dir)?;

    println!("detect_video summary:");
    println!("  input: {}", report.input);
    println!("  frames processed: {}", report.frames_processed);
    println!("  stopped early: {}", report.cancelled);
    if report.classes.is_empty() {
        println!("  classes: (none)");
    } else {
        println!("  classes: {}", report.classes.join(", "));
    }
    println!("  output: {}", report.output_path().display());
    if let Some(err) = &report.rename_error {
        println!("  rename: FAILED ({})", err);
    }
    Ok(())
}
