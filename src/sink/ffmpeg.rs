//! FFmpeg-backed output container.
//!
//! Frames arrive as RGB24, are converted to the codec's planar format and
//! encoded with a constant frame rate (pts = frame index in `1/fps` units).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::util::format::pixel::Pixel;
use ffmpeg::{codec, encoder, format, software::scaling, Rational};

use super::SinkSettings;
use crate::frame::Frame;
use crate::media::Codec;

pub(crate) struct FfmpegSink {
    output: format::context::Output,
    encoder: encoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

fn codec_id(codec: Codec) -> codec::Id {
    match codec {
        Codec::Xvid | Codec::Mp4v => codec::Id::MPEG4,
        Codec::Mjpeg => codec::Id::MJPEG,
    }
}

fn encoder_pixel_format(codec: Codec) -> Pixel {
    match codec {
        Codec::Mjpeg => Pixel::YUVJ420P,
        Codec::Xvid | Codec::Mp4v => Pixel::YUV420P,
    }
}

impl FfmpegSink {
    pub(crate) fn open(path: &Path, settings: &SinkSettings) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = format::output(&path)
            .with_context(|| format!("failed to create output container {}", path.display()))?;
        let codec = encoder::find(codec_id(settings.codec))
            .ok_or_else(|| anyhow!("ffmpeg has no {} encoder", settings.codec.fourcc_str()))?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let pixel = encoder_pixel_format(settings.codec);
        let encoder_time_base = Rational::new(1, settings.fps as i32);
        let (stream_index, encoder) = {
            let mut stream = output.add_stream(codec).context("add output video stream")?;
            let mut video = codec::context::Context::new_with_codec(codec)
                .encoder()
                .video()
                .context("create video encoder")?;
            video.set_width(settings.width);
            video.set_height(settings.height);
            video.set_format(pixel);
            video.set_time_base(encoder_time_base);
            video.set_frame_rate(Some(Rational::new(settings.fps as i32, 1)));
            if global_header {
                video.set_flags(codec::Flags::GLOBAL_HEADER);
            }
            let opened = video
                .open_as(codec)
                .with_context(|| format!("open {} encoder", settings.codec.fourcc_str()))?;
            stream.set_parameters(&opened);
            stream.set_time_base(encoder_time_base);
            (stream.index(), opened)
        };

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| anyhow!("output stream vanished after header"))?
            .time_base();

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            settings.width,
            settings.height,
            pixel,
            settings.width,
            settings.height,
            scaling::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width: settings.width,
            height: settings.height,
            next_pts: 0,
            finished: false,
        })
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let pixels = frame.pixels();
        let plane = rgb.data_mut(0);
        for row in 0..self.height as usize {
            let src = pixels
                .get(row * row_bytes..(row + 1) * row_bytes)
                .context("frame row is out of bounds")?;
            plane
                .get_mut(row * stride..row * stride + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        let mut converted = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut converted)
            .context("convert frame for encoder")?;
        converted.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&converted)
            .context("send frame to encoder")?;
        self.drain_packets()
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .context("write container trailer")
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}
