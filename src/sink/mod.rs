//! Output video sinks.
//!
//! A sink is opened on the provisional output path, accepts frames at exactly
//! its configured size, and on `close` flushes and finalizes the container so
//! the file is complete on disk. Nothing may rename the file before `close`
//! has returned.

#[cfg(feature = "encode-ffmpeg")]
mod ffmpeg;
mod rawvideo;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::media::Codec;

#[cfg(feature = "encode-ffmpeg")]
use self::ffmpeg::FfmpegSink;
use self::rawvideo::RawVideoSink;

pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the container.
    fn close(&mut self) -> Result<()>;
}

/// Which encoder writes the output file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncoderKind {
    /// FFmpeg container + codec (feature: encode-ffmpeg).
    #[default]
    Ffmpeg,
    /// Headerless RGB24 frames, no container.
    RawVideo,
}

impl EncoderKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "rawvideo" | "raw" => Ok(Self::RawVideo),
            other => Err(anyhow!(
                "unknown encoder '{}' (expected ffmpeg or rawvideo)",
                other
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::RawVideo => "rawvideo",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SinkSettings {
    pub codec: Codec,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub encoder: EncoderKind,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            fps: 30,
            width: crate::render::DEFAULT_OUTPUT_WIDTH,
            height: crate::render::DEFAULT_OUTPUT_HEIGHT,
            encoder: EncoderKind::default(),
        }
    }
}

/// Output video file.
pub struct VideoSink {
    backend: SinkBackend,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
    closed: bool,
}

enum SinkBackend {
    RawVideo(RawVideoSink),
    #[cfg(feature = "encode-ffmpeg")]
    Ffmpeg(FfmpegSink),
}

impl VideoSink {
    pub fn open(path: &Path, settings: &SinkSettings) -> Result<Self> {
        if settings.width == 0 || settings.height == 0 || settings.fps == 0 {
            return Err(anyhow!(
                "sink needs a non-zero size and frame rate (got {}x{} @ {})",
                settings.width,
                settings.height,
                settings.fps
            ));
        }
        let backend = match settings.encoder {
            EncoderKind::RawVideo => SinkBackend::RawVideo(RawVideoSink::create(path)?),
            #[cfg(feature = "encode-ffmpeg")]
            EncoderKind::Ffmpeg => SinkBackend::Ffmpeg(FfmpegSink::open(path, settings)?),
            #[cfg(not(feature = "encode-ffmpeg"))]
            EncoderKind::Ffmpeg => {
                return Err(anyhow!(
                    "the ffmpeg encoder requires the encode-ffmpeg feature"
                ))
            }
        };
        log::info!(
            "VideoSink: opened {} ({}, {}, {}x{} @ {} fps)",
            path.display(),
            settings.encoder.name(),
            settings.codec.fourcc_str(),
            settings.width,
            settings.height,
            settings.fps
        );
        Ok(Self {
            backend,
            path: path.to_path_buf(),
            width: settings.width,
            height: settings.height,
            frames_written: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("write to a closed sink"));
        }
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, sink expects {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        match &mut self.backend {
            SinkBackend::RawVideo(sink) => sink.write(frame)?,
            #[cfg(feature = "encode-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write(frame)?,
        }
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &mut self.backend {
            SinkBackend::RawVideo(sink) => sink.finish()?,
            #[cfg(feature = "encode-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.finish()?,
        }
        log::debug!(
            "VideoSink: closed {} after {} frames",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_settings(width: u32, height: u32) -> SinkSettings {
        SinkSettings {
            width,
            height,
            encoder: EncoderKind::RawVideo,
            ..SinkSettings::default()
        }
    }

    #[test]
    fn rawvideo_sink_writes_frames_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip_detecting.mp4");
        let mut sink = VideoSink::open(&path, &raw_settings(2, 1))?;
        sink.write(&Frame::filled(2, 1, [1, 2, 3])?)?;
        sink.write(&Frame::filled(2, 1, [4, 5, 6])?)?;
        sink.close()?;
        sink.close()?;

        assert_eq!(sink.frames_written(), 2);
        assert_eq!(
            std::fs::read(&path)?,
            vec![1, 2, 3, 1, 2, 3, 4, 5, 6, 4, 5, 6]
        );
        Ok(())
    }

    #[test]
    fn rejects_wrong_size_and_writes_after_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = VideoSink::open(&dir.path().join("a.avi"), &raw_settings(4, 4))?;
        assert!(sink.write(&Frame::filled(2, 2, [0, 0, 0])?).is_err());
        sink.close()?;
        assert!(sink.write(&Frame::filled(4, 4, [0, 0, 0])?).is_err());
        Ok(())
    }

    #[test]
    fn parses_encoder_names() -> Result<()> {
        assert_eq!(EncoderKind::parse("FFmpeg")?, EncoderKind::Ffmpeg);
        assert_eq!(EncoderKind::parse("rawvideo")?, EncoderKind::RawVideo);
        assert!(EncoderKind::parse("gif").is_err());
        Ok(())
    }
}
