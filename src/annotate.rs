//! Single-image annotation.
//!
//! Images go through detection once and are written back at their native
//! resolution as `<basename>_annotated.<ext>`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::detect::{Detection, DetectionAdapter};
use crate::frame::Frame;
use crate::media::MediaKind;
use crate::render::AnnotationRenderer;

pub const ANNOTATED_SUFFIX: &str = "_annotated";

#[derive(Debug)]
pub struct ImageReport {
    pub output_path: PathBuf,
    pub detections: Vec<Detection>,
}

pub fn annotate_image(
    input: &Path,
    output_dir: &Path,
    detector: &mut DetectionAdapter<'_>,
    renderer: &AnnotationRenderer,
) -> Result<ImageReport> {
    if MediaKind::from_path(input) != MediaKind::Image {
        return Err(anyhow!("'{}' is not a supported image", input.display()));
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("cannot derive a basename from '{}'", input.display()))?;
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let image = image::open(input)
        .with_context(|| format!("failed to decode image {}", input.display()))?
        .into_rgb8();
    let frame = Frame::from_image(image);
    let detections = detector
        .detect(&frame)
        .with_context(|| format!("detection on {}", input.display()))?;
    let annotated = renderer.draw(frame, &detections)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {}", output_dir.display()))?;
    let output_path = output_dir.join(format!("{}{}.{}", stem, ANNOTATED_SUFFIX, extension));
    annotated
        .into_image()?
        .save(&output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    log::info!(
        "annotated {} -> {} ({} detections)",
        input.display(),
        output_path.display(),
        detections.len()
    );
    Ok(ImageReport {
        output_path,
        detections,
    })
}
