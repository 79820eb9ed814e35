use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;

/// Headerless RGB24 stream, one frame after another.
///
/// Playable with `ffplay -f rawvideo -pixel_format rgb24 -video_size WxH`.
pub(crate) struct RawVideoSink {
    writer: Option<BufWriter<File>>,
}

impl RawVideoSink {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("rawvideo sink already finished"))?;
        writer.write_all(frame.pixels()).context("write raw frame")
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("flush raw frames: {}", e.error()))?;
        file.sync_all().context("sync raw video file")
    }
}
