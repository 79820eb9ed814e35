use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sink::EncoderKind;

const DEFAULT_OUTPUT_SUBDIR: &str = "Downloads/DetectedVideos";
const DEFAULT_WIDTH: u32 = crate::render::DEFAULT_OUTPUT_WIDTH;
const DEFAULT_HEIGHT: u32 = crate::render::DEFAULT_OUTPUT_HEIGHT;
const DEFAULT_FPS: u32 = crate::pipeline::DEFAULT_OUTPUT_FPS;
const DEFAULT_MODEL_PATH: &str = "my_model.onnx";
const DEFAULT_LABELS_PATH: &str = "classes.txt";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_SYNTHETIC_FRAMES: u64 = 30;

#[cfg(feature = "backend-tract")]
const DEFAULT_BACKEND: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_BACKEND: &str = "stub";

#[derive(Debug, Deserialize, Default)]
struct SightingsConfigFile {
    output_dir: Option<PathBuf>,
    output: Option<OutputConfigFile>,
    detector: Option<DetectorConfigFile>,
    synthetic_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    encoder: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct SightingsConfig {
    pub output_dir: PathBuf,
    pub output: OutputConfig,
    pub detector: DetectorConfig,
    /// Length of `stub://` inputs.
    pub synthetic_frames: u64,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub encoder: EncoderKind,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub backend: String,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl SightingsConfig {
    /// Defaults, then the file named by `SIGHTINGS_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTINGS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SightingsConfigFile) -> Result<Self> {
        let output_dir = file.output_dir.unwrap_or_else(default_output_dir);
        let out = file.output.unwrap_or_default();
        let encoder = match out.encoder.as_deref() {
            Some(name) => EncoderKind::parse(name)?,
            None => EncoderKind::default(),
        };
        let det = file.detector.unwrap_or_default();
        Ok(Self {
            output_dir,
            output: OutputConfig {
                width: out.width.unwrap_or(DEFAULT_WIDTH),
                height: out.height.unwrap_or(DEFAULT_HEIGHT),
                fps: out.fps.unwrap_or(DEFAULT_FPS),
                encoder,
            },
            detector: DetectorConfig {
                backend: det.backend.unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: det
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: det
                    .labels_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
                input_size: det.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: det.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
                iou_threshold: det.iou_threshold.unwrap_or(DEFAULT_IOU),
            },
            synthetic_frames: file.synthetic_frames.unwrap_or(DEFAULT_SYNTHETIC_FRAMES),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("SIGHTINGS_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("SIGHTINGS_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("SIGHTINGS_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("SIGHTINGS_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.detector.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(encoder) = std::env::var("SIGHTINGS_ENCODER") {
            if !encoder.trim().is_empty() {
                self.output.encoder = EncoderKind::parse(&encoder)?;
            }
        }
        if let Ok(confidence) = std::env::var("SIGHTINGS_CONFIDENCE") {
            self.detector.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTINGS_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(anyhow!("output width and height must be greater than zero"));
        }
        if self.output.fps == 0 {
            return Err(anyhow!("output fps must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!("IoU threshold must be within [0, 1]"));
        }
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(DEFAULT_OUTPUT_SUBDIR),
        None => PathBuf::from("DetectedVideos"),
    }
}

fn read_config_file(path: &Path) -> Result<SightingsConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
