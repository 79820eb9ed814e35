//! Media classification and container → codec selection.

use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Video containers accepted by the detection pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoContainer {
    Avi,
    Mov,
    Mp4,
}

impl VideoContainer {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "avi" => Some(Self::Avi),
            "mov" => Some(Self::Mov),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mp4 => "mp4",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Video(VideoContainer),
    Image,
    Unsupported,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Unsupported;
        };
        if let Some(container) = VideoContainer::from_extension(ext) {
            return Self::Video(container);
        }
        let lower = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&lower.as_str()) {
            Self::Image
        } else {
            Self::Unsupported
        }
    }
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Output codecs. Each is identified by the FourCC the container carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// MPEG-4 part 2, Xvid tag. Used for AVI.
    Xvid,
    /// Motion JPEG. Used for MOV.
    Mjpeg,
    /// MPEG-4 part 2, mp4v tag.
    #[default]
    Mp4v,
}

impl Codec {
    /// Codec for an output file extension. Unknown extensions get the default.
    pub fn for_extension(ext: &str) -> Self {
        match VideoContainer::from_extension(ext) {
            Some(VideoContainer::Avi) => Self::Xvid,
            Some(VideoContainer::Mov) => Self::Mjpeg,
            Some(VideoContainer::Mp4) | None => Self::Mp4v,
        }
    }

    pub fn fourcc_str(self) -> &'static str {
        match self {
            Self::Xvid => "XVID",
            Self::Mjpeg => "MJPG",
            Self::Mp4v => "mp4v",
        }
    }
}
