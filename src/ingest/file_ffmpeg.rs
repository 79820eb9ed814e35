//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a container to RGB24 at its native
//! resolution. At end of input the decoder is drained so frames it still
//! buffers are not lost.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::{FileConfig, FileStats};
use crate::frame::Frame;

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
}

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    state: Option<Decoding>,
    eof_sent: bool,
    frame_count: u64,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: opened {} (ffmpeg, {}x{})",
            config.path,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            config,
            state: Some(Decoding {
                input,
                stream_index,
                decoder,
                scaler,
            }),
            eof_sent: false,
            frame_count: 0,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg source already closed"))?;
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            let received = state.decoder.receive_frame(&mut decoded);
            match classify_receive(received).context("decode video frame")? {
                Received::Frame => {
                    let frame = convert(&mut state.scaler, &decoded)?;
                    self.frame_count += 1;
                    return Ok(Some(frame));
                }
                Received::Drained => return Ok(None),
                Received::NeedInput if self.eof_sent => return Ok(None),
                Received::NeedInput => {}
            }

            loop {
                let mut packet = ffmpeg::Packet::empty();
                let read = packet.read(&mut state.input);
                if !classify_read(read)
                    .with_context(|| format!("demux packet from '{}'", self.config.path))?
                {
                    state
                        .decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                    break;
                }
                if packet.stream() != state.stream_index {
                    continue;
                }
                state
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                break;
            }
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        // Dropping the demuxer and decoder releases the file handle.
        self.state.take();
        Ok(())
    }

    pub(crate) fn stats(&self) -> FileStats {
        FileStats {
            frames_read: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Received {
    Frame,
    /// The decoder wants another packet.
    NeedInput,
    /// Flushed and empty.
    Drained,
}

fn classify_receive(result: Result<(), ffmpeg::Error>) -> Result<Received> {
    match result {
        Ok(()) => Ok(Received::Frame),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            Ok(Received::NeedInput)
        }
        Err(ffmpeg::Error::Eof) => Ok(Received::Drained),
        Err(e) => Err(anyhow::Error::new(e)),
    }
}

/// `true` when a packet was read, `false` at end of input.
fn classify_read(result: Result<(), ffmpeg::Error>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg::Error::Eof) => Ok(false),
        Err(e) => Err(anyhow::Error::new(e)),
    }
}

fn convert(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
) -> Result<Frame> {
    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .context("scale frame to RGB")?;
    let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
    Frame::from_rgb(pixels, width, height)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
