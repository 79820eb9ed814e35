use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::result::Detection;
use crate::frame::Frame;

/// Wraps a backend and normalizes what it reports for one frame.
///
/// Detections below `min_confidence` are dropped, regions are clamped to the
/// frame, and a confidence outside `[0, 1]` is treated as a backend failure.
pub struct DetectionAdapter<'a> {
    backend: &'a mut dyn DetectorBackend,
    min_confidence: f32,
}

impl<'a> DetectionAdapter<'a> {
    pub fn new(backend: &'a mut dyn DetectorBackend) -> Self {
        Self {
            backend,
            min_confidence: 0.0,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let raw = self.backend.detect(frame)?;
        let mut out = Vec::with_capacity(raw.len());
        for detection in raw {
            if !detection.confidence.is_finite() || !(0.0..=1.0).contains(&detection.confidence)
            {
                return Err(anyhow!(
                    "backend '{}' reported confidence {} for '{}'",
                    self.backend.name(),
                    detection.confidence,
                    detection.label
                ));
            }
            if detection.confidence < self.min_confidence {
                continue;
            }
            out.push(Detection {
                region: detection.region.clamped(frame.width, frame.height),
                ..detection
            });
        }
        Ok(out)
    }
}
