use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for testing and demos.
///
/// With no script it reports nothing. With a script it replays one detection
/// set per call, in order, and reports nothing once the script runs out.
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Vec<Detection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    /// Number of frames this backend has been asked about.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn replays_script_then_goes_quiet() -> Result<()> {
        let dog = Detection::new("dog", 0.9, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        let mut backend = StubBackend::scripted(vec![vec![], vec![dog.clone()]]);
        let frame = Frame::filled(8, 8, [0, 0, 0])?;

        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.detect(&frame)?, vec![dog]);
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 3);
        Ok(())
    }
}
