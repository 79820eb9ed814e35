pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::{Context, Result};
use std::path::Path;

/// Read a `classes.txt` style label file: one class name per line, index = line number.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    Ok(raw.lines().map(|line| line.trim().to_string()).collect())
}
