#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output tensor shaped `[1, 4 + classes, anchors]` where the
/// first four rows are `cx, cy, w, h` in model input pixels and the remaining
/// rows are per-class scores. Frames are stretched to the square model input;
/// boxes are mapped back to frame coordinates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Vec<String>, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if labels.is_empty() {
            return Err(anyhow!("detector needs at least one class label"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not fit its dimensions"))?;
        let resized = imageops::resize(&image, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;
        let (_, rows, anchors) = view.dim();
        let classes = rows
            .checked_sub(4)
            .ok_or_else(|| anyhow!("model output has {} rows, expected at least 5", rows))?;
        if classes > self.labels.len() {
            return Err(anyhow!(
                "model reports {} classes but only {} labels were loaded",
                classes,
                self.labels.len()
            ));
        }

        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..classes {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if !best_score.is_finite() || best_score < self.confidence_threshold {
                continue;
            }
            let region = BoundingBox::from_center(
                view[[0, 0, anchor]],
                view[[0, 1, anchor]],
                view[[0, 2, anchor]],
                view[[0, 3, anchor]],
            )
            .scaled(sx, sy);
            candidates.push(Detection::new(
                self.labels[best_class].clone(),
                best_score.min(1.0),
                region,
            ));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.label == candidate.label && k.region.iou(&candidate.region) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_best_of_overlapping_same_class() {
        let a = Detection::new("dog", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = Detection::new("dog", 0.6, BoundingBox::new(1.0, 1.0, 10.0, 10.0));
        let c = Detection::new("cat", 0.5, BoundingBox::new(1.0, 1.0, 10.0, 10.0));
        let kept = non_max_suppression(vec![b, a.clone(), c.clone()], 0.45);
        assert_eq!(kept, vec![a, c]);
    }
}
