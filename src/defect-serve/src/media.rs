use std::fmt;

use image::ImageFormat;
use thiserror::Error;

/// Media types accepted for upload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaType {
    Jpeg,
    Png,
}

/// The declared content type is outside the JPEG/PNG allow-list.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("unsupported media type '{0}'")]
pub struct UnsupportedMediaType(pub String);

impl MediaType {
    /// Resolve a declared content type against the allow-list.
    ///
    /// `image/jpeg` and `image/jpg` both map to JPEG, `image/png` to PNG.
    /// Matching ignores ASCII case and any `;`-separated parameters.
    pub fn from_declared(declared: &str) -> Result<Self, UnsupportedMediaType> {
        let essence = declared.split(';').next().unwrap_or_default().trim();

        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(MediaType::Jpeg),
            "image/png" => Ok(MediaType::Png),
            _ => Err(UnsupportedMediaType(declared.to_owned())),
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            MediaType::Jpeg => ImageFormat::Jpeg,
            MediaType::Png => ImageFormat::Png,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
