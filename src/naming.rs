//! Detection aggregation and output naming.
//!
//! While a run streams, the aggregator records which classes appeared. Once
//! the run is over, the final filename is a pure function of that state and
//! the input's basename:
//!
//! - something seen: `<sorted labels joined by '-'>-<basename>.<ext>`
//! - nothing seen:   `no-animals-detected-<basename>.<ext>`
//!
//! Labels have spaces replaced by `_` so they are safe in a filename.

use std::collections::BTreeSet;

use crate::detect::Detection;

/// Prefix used when no class was observed during the run.
pub const NO_DETECTION_PREFIX: &str = "no-animals-detected";
/// Suffix appended to the basename while the output is still being written.
pub const PROVISIONAL_SUFFIX: &str = "_detecting";

const LABEL_SPACE_REPLACEMENT: &str = "_";
const CLASS_JOINER: &str = "-";

/// `<basename>_detecting.<ext>`
pub fn provisional_filename(basename: &str, extension: &str) -> String {
    format!("{}{}.{}", basename, PROVISIONAL_SUFFIX, extension)
}

/// Replace spaces so the label can sit in a filename.
pub fn normalize_label(label: &str) -> String {
    label.replace(' ', LABEL_SPACE_REPLACEMENT)
}

#[derive(Clone, Debug, Default)]
pub struct DetectionAggregator {
    any_detection: bool,
    seen_classes: BTreeSet<String>,
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed frame's detections.
    ///
    /// Blank labels count as a detection but add no class.
    pub fn record(&mut self, detections: &[Detection]) {
        if detections.is_empty() {
            return;
        }
        self.any_detection = true;
        for detection in detections {
            if detection.label.trim().is_empty() {
                continue;
            }
            self.seen_classes.insert(normalize_label(&detection.label));
        }
    }

    pub fn any_detection(&self) -> bool {
        self.any_detection
    }

    /// Normalized classes in sorted order.
    pub fn classes(&self) -> Vec<String> {
        self.seen_classes.iter().cloned().collect()
    }

    /// Sorted classes joined with `-`, or `None` when nothing usable was seen.
    pub fn class_token(&self) -> Option<String> {
        if !self.any_detection || self.seen_classes.is_empty() {
            return None;
        }
        Some(
            self.seen_classes
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(CLASS_JOINER),
        )
    }

    /// Final output filename for this run's state.
    pub fn final_filename(&self, basename: &str, extension: &str) -> String {
        match self.class_token() {
            Some(token) => format!("{}-{}.{}", token, basename, extension),
            None => format!("{}-{}.{}", NO_DETECTION_PREFIX, basename, extension),
        }
    }
}
