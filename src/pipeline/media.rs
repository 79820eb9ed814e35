use std::path::Path;

use anyhow::Result;

use crate::ingest::{FileConfig, FileSource, FrameSource};
use crate::sink::{FrameSink, SinkSettings, VideoSink};

/// Opens the two ends of a run. The controller owns what it opens and closes it.
pub trait MediaOpener {
    fn open_source(&mut self, input: &str) -> Result<Box<dyn FrameSource>>;

    fn open_sink(&mut self, path: &Path, settings: &SinkSettings) -> Result<Box<dyn FrameSink>>;
}

/// Local files: `FileSource` in, `VideoSink` out.
#[derive(Clone, Debug)]
pub struct FileMedia {
    /// Length of `stub://` inputs.
    pub synthetic_frames: u64,
}

impl Default for FileMedia {
    fn default() -> Self {
        Self {
            synthetic_frames: FileConfig::default().synthetic_frames,
        }
    }
}

impl MediaOpener for FileMedia {
    fn open_source(&mut self, input: &str) -> Result<Box<dyn FrameSource>> {
        let source = FileSource::open(FileConfig {
            path: input.to_string(),
            synthetic_frames: self.synthetic_frames,
        })?;
        Ok(Box::new(source))
    }

    fn open_sink(&mut self, path: &Path, settings: &SinkSettings) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(VideoSink::open(path, settings)?))
    }
}
