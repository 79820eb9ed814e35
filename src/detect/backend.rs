use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is the model collaborator: it owns model loading and inference
/// and is invoked once per frame. The pipeline treats it as a pure function
/// from frame to detections; any internal state (e.g. a frame counter in the
/// scripted stub) must not leak into the results' meaning.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Regions are reported in the frame's own pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
