//! Annotation rendering.
//!
//! Draws detections onto a frame and normalizes it to the output resolution.
//! Each class gets a stable color picked from a fixed palette by hashing its
//! label, so a label looks the same in every frame and every run.

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::detect::Detection;
use crate::frame::Frame;

pub const DEFAULT_OUTPUT_WIDTH: u32 = 1280;
pub const DEFAULT_OUTPUT_HEIGHT: u32 = 720;

const BOX_THICKNESS: u32 = 2;
const TAB_HEIGHT: u32 = 12;
const TAB_CHAR_WIDTH: u32 = 7;

const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [203, 56, 255],
];

/// Color used for a label's box and tab.
pub fn label_color(label: &str) -> [u8; 3] {
    let digest = Sha256::digest(label.as_bytes());
    PALETTE[digest[0] as usize % PALETTE.len()]
}

#[derive(Clone, Copy, Debug)]
pub struct AnnotationRenderer {
    width: u32,
    height: u32,
}

impl AnnotationRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Annotate and resize to the output resolution. Consumes the input frame.
    pub fn render(&self, frame: Frame, detections: &[Detection]) -> Result<Frame> {
        let mut image = frame.into_image()?;
        draw_detections(&mut image, detections);
        if image.dimensions() != (self.width, self.height) {
            image = imageops::resize(&image, self.width, self.height, FilterType::Triangle);
        }
        Ok(Frame::from_image(image))
    }

    /// Annotate at the frame's own resolution.
    pub fn draw(&self, frame: Frame, detections: &[Detection]) -> Result<Frame> {
        let mut image = frame.into_image()?;
        draw_detections(&mut image, detections);
        Ok(Frame::from_image(image))
    }
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_WIDTH, DEFAULT_OUTPUT_HEIGHT)
    }
}

pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        let color = Rgb(label_color(&detection.label));
        let region = detection.region.clamped(image.width(), image.height());
        let x0 = region.x_min.floor() as u32;
        let y0 = region.y_min.floor() as u32;
        let x1 = region.x_max.ceil() as u32;
        let y1 = region.y_max.ceil() as u32;
        if x1 <= x0 || y1 <= y0 {
            continue;
        }
        draw_outline(image, x0, y0, x1, y1, color);

        let tab_width = (detection.label.chars().count() as u32 + 5) * TAB_CHAR_WIDTH;
        let tab_y0 = y0.saturating_sub(TAB_HEIGHT);
        fill_rect(image, x0, tab_y0, x0 + tab_width, tab_y0 + TAB_HEIGHT, color);
    }
}

fn draw_outline(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let t = BOX_THICKNESS;
    fill_rect(image, x0, y0, x1, y0 + t, color);
    fill_rect(image, x0, y1.saturating_sub(t), x1, y1, color);
    fill_rect(image, x0, y0, x0 + t, y1, color);
    fill_rect(image, x1.saturating_sub(t), y0, x1, y1, color);
}

/// Fill `[x0, x1) x [y0, y1)`, clipped to the image.
fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(image.width());
    let y1 = y1.min(image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn output_is_canonical_size() -> Result<()> {
        let renderer = AnnotationRenderer::default();
        for (w, h) in [(640, 480), (1920, 1080), (1280, 720)] {
            let frame = Frame::filled(w, h, [0, 0, 0])?;
            let out = renderer.render(frame, &[])?;
            assert_eq!((out.width, out.height), (1280, 720));
            assert_eq!(out.byte_len(), 1280 * 720 * 3);
        }
        Ok(())
    }

    #[test]
    fn draws_box_in_label_color() -> Result<()> {
        let renderer = AnnotationRenderer::new(100, 100);
        let frame = Frame::filled(100, 100, [0, 0, 0])?;
        let dog = Detection::new("dog", 0.9, BoundingBox::new(20.0, 30.0, 60.0, 80.0));
        let out = renderer.render(frame, &[dog])?;

        let color = label_color("dog");
        assert_eq!(out.pixel(40, 30), Some(color));
        assert_eq!(out.pixel(20, 50), Some(color));
        assert_eq!(out.pixel(40, 55), Some([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn label_color_is_stable() {
        assert_eq!(label_color("Sea Bird"), label_color("Sea Bird"));
    }
}
