//! Merging two labeled image datasets.
//!
//! A dataset directory holds `images/`, `labels/` (one `<stem>.txt` per
//! image), an optional `classes.txt`, and an optional `notes.json`. Merging
//! copies both datasets into one output tree, prefixing the second dataset's
//! filenames so they cannot collide with the first's.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::media::is_image_extension;

pub const DEFAULT_SECOND_PREFIX: &str = "ds2_";
const CLASSES_FILE: &str = "classes.txt";
const NOTES_FILE: &str = "notes.json";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyCounts {
    pub images: usize,
    pub labels: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSummary {
    pub first: CopyCounts,
    pub second: CopyCounts,
    pub classes: Vec<String>,
    pub notes_from: Option<PathBuf>,
}

impl MergeSummary {
    pub fn total_images(&self) -> usize {
        self.first.images + self.second.images
    }

    pub fn total_labels(&self) -> usize {
        self.first.labels + self.second.labels
    }
}

pub fn combine_datasets(
    first: &Path,
    second: &Path,
    output: &Path,
    second_prefix: &str,
) -> Result<MergeSummary> {
    log::info!(
        "combining datasets {} + {} -> {}",
        first.display(),
        second.display(),
        output.display()
    );
    fs::create_dir_all(output)
        .with_context(|| format!("create output directory {}", output.display()))?;

    let classes = merge_classes(first, second, output)?;
    let first_counts = copy_dataset(first, output, "")?;
    let second_counts = copy_dataset(second, output, second_prefix)?;

    let mut notes_from = None;
    for dataset in [first, second] {
        let notes = dataset.join(NOTES_FILE);
        if notes.is_file() {
            fs::copy(&notes, output.join(NOTES_FILE))
                .with_context(|| format!("copy {}", notes.display()))?;
            log::info!("copied {} from {}", NOTES_FILE, dataset.display());
            notes_from = Some(notes);
            break;
        }
    }

    let summary = MergeSummary {
        first: first_counts,
        second: second_counts,
        classes,
        notes_from,
    };
    log::info!(
        "combined dataset: {} images, {} labels",
        summary.total_images(),
        summary.total_labels()
    );
    Ok(summary)
}

/// Reads a classes file. A missing file yields no classes.
pub fn read_classes(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        log::warn!("classes file not found at {}", path.display());
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("read classes {}", path.display()))?;
    Ok(raw.lines().map(|line| line.trim().to_string()).collect())
}

/// Order-preserving union: every class of `first`, then the new ones of `second`.
pub fn union_classes(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for class in first.iter().chain(second) {
        if !merged.contains(class) {
            merged.push(class.clone());
        }
    }
    merged
}

fn merge_classes(first: &Path, second: &Path, output: &Path) -> Result<Vec<String>> {
    let classes1 = read_classes(&first.join(CLASSES_FILE))?;
    let classes2 = read_classes(&second.join(CLASSES_FILE))?;

    let combined = match (classes1.is_empty(), classes2.is_empty()) {
        (false, false) if classes1 == classes2 => classes1,
        (false, false) => {
            log::warn!(
                "class files differ between datasets: {:?} vs {:?}",
                classes1,
                classes2
            );
            let union = union_classes(&classes1, &classes2);
            log::warn!(
                "using combined classes {:?}; label files of the second dataset may need new class ids",
                union
            );
            union
        }
        (false, true) => classes1,
        (true, false) => classes2,
        (true, true) => {
            log::warn!("no classes file found in either dataset");
            Vec::new()
        }
    };

    if !combined.is_empty() {
        let path = output.join(CLASSES_FILE);
        let mut body = combined.join("\n");
        body.push('\n');
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(combined)
}

fn copy_dataset(dataset: &Path, output: &Path, prefix: &str) -> Result<CopyCounts> {
    let images_dir = dataset.join("images");
    let labels_dir = dataset.join("labels");
    let out_images = output.join("images");
    let out_labels = output.join("labels");
    fs::create_dir_all(&out_images)?;
    fs::create_dir_all(&out_labels)?;

    let images = list_images(&images_dir)?;
    log::info!("found {} images in {}", images.len(), images_dir.display());

    let mut counts = CopyCounts::default();
    for image in images {
        let (Some(stem), Some(file_name)) = (
            image.file_stem().and_then(|s| s.to_str()),
            image.file_name().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let new_name = format!("{}{}", prefix, file_name);
        fs::copy(&image, out_images.join(&new_name))
            .with_context(|| format!("copy {}", image.display()))?;
        counts.images += 1;

        let label = labels_dir.join(format!("{}.txt", stem));
        if label.is_file() {
            fs::copy(&label, out_labels.join(format!("{}{}.txt", prefix, stem)))
                .with_context(|| format!("copy {}", label.display()))?;
            counts.labels += 1;
        } else {
            log::warn!("no label file found for {}", file_name);
        }
    }

    log::info!(
        "copied {} images and {} label files from {}",
        counts.images,
        counts.labels,
        dataset.display()
    );
    Ok(counts)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        log::warn!("images directory not found at {}", dir.display());
        return Ok(Vec::new());
    }
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(is_image_extension);
        if path.is_file() && is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
