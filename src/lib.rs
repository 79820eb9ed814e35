//! Sightings
//!
//! Runs an object detector over uploaded media. Images are annotated once.
//! Videos are decoded frame by frame, annotated, re-encoded at a fixed output
//! resolution and rate, and the output file is named only after the whole run,
//! from the classes that were actually seen.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames
//! - `ingest`: frame sources (synthetic, FFmpeg file decode)
//! - `detect`: detector backends, registry, and the detection adapter
//! - `render`: box drawing and resize to the output resolution
//! - `sink`: output video writers (FFmpeg, rawvideo)
//! - `naming`: detection aggregation and the output naming policy
//! - `pipeline`: the run controller and its state machine
//! - `cancel`: the stop control polled by a run
//! - `annotate`: single-image path
//! - `dataset`: merging two labeled datasets
//! - `config`: file + environment configuration

pub mod annotate;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod media;
pub mod naming;
pub mod pipeline;
pub mod render;
pub mod sink;
pub mod ui;

pub use annotate::{annotate_image, ImageReport};
pub use cancel::CancelToken;
pub use config::SightingsConfig;
pub use dataset::{combine_datasets, MergeSummary};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionAdapter, DetectorBackend, StubBackend,
};
pub use frame::Frame;
pub use ingest::{FileConfig, FileSource, FrameSource};
pub use media::{Codec, MediaKind, VideoContainer};
pub use naming::{DetectionAggregator, NO_DETECTION_PREFIX};
pub use pipeline::{
    FileMedia, FrameObserver, MediaOpener, OutputSettings, Pipeline, PipelineError,
    PipelineState, RunReport, Stage,
};
pub use render::AnnotationRenderer;
pub use sink::{EncoderKind, FrameSink, SinkSettings, VideoSink};

use anyhow::Result;

/// Build a registry holding the backend named in `cfg`.
pub fn registry_from_config(cfg: &config::DetectorConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    match cfg.backend.as_str() {
        "stub" => registry.register(StubBackend::new()),
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let labels = detect::load_labels(&cfg.labels_path)?;
            let backend =
                detect::TractBackend::new(&cfg.model_path, labels, cfg.input_size)?
                    .with_threshold(cfg.confidence_threshold)
                    .with_iou_threshold(cfg.iou_threshold);
            registry.register(backend);
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown or disabled detector backend '{}'",
                other
            ))
        }
    }
    Ok(registry)
}
