//! Frame sources.
//!
//! A source yields decoded frames of one video, in order, until the end of the
//! stream. It is not restartable: reading again means opening a new source.
//!
//! - Synthetic `stub://` source (tests, demos)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source must be closed exactly once by its owner; `close` releases the
//! underlying decoder and file handle.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats};

pub trait FrameSource {
    /// Next decoded frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying handle.
    fn close(&mut self) -> Result<()>;
}

/// Scheme marking synthetic inputs, e.g. `stub://dog.mp4`.
pub const STUB_SCHEME: &str = "stub://";
