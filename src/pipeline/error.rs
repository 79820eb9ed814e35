use std::fmt;

/// Where in a run an error happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Source or sink could not be opened, or the run was refused.
    Open,
    /// Decoding the next frame failed.
    Read,
    /// The detector backend failed.
    Detect,
    /// Annotating or resizing failed.
    Render,
    /// Encoding, flushing, or finalizing the output failed.
    Write,
    /// The finished output could not be moved to its final name.
    Rename,
}

impl Stage {
    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "OPEN_ERROR",
            Self::Read => "READ_ERROR",
            Self::Detect => "DETECTION_ERROR",
            Self::Render => "RENDER_ERROR",
            Self::Write => "WRITE_ERROR",
            Self::Rename => "RENAME_ERROR",
        }
    }
}

/// A pipeline failure: the stage plus the underlying cause.
#[derive(Debug)]
pub struct PipelineError {
    pub stage: Stage,
    pub cause: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, cause: anyhow::Error) -> Self {
        Self { stage, cause }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.stage.code(), self.cause)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn display_carries_stage_and_cause_chain() {
        let cause = Err::<(), _>(anyhow!("disk full"))
            .context("write encoded packet")
            .unwrap_err();
        let err = PipelineError::new(Stage::Write, cause);
        assert_eq!(err.to_string(), "WRITE_ERROR: write encoded packet: disk full");
    }
}
