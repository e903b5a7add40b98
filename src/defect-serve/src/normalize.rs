//! Turns uploaded bytes into the fixed-shape tensor the classifier consumes.
//!
//! Every successful call yields a 150x150 RGB image and its `[0, 1]` scaled
//! tensor, whatever the size or channel layout of the upload.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageError, Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;

use crate::media::MediaType;
use crate::Timer;

/// Side length, in pixels, of the square image fed to the classifier.
pub const SIDE: u32 = 150;

pub const HEIGHT: usize = SIDE as usize;
pub const WIDTH: usize = SIDE as usize;
pub const CHANNELS: usize = 3;

/// The bytes do not parse as an image of the declared family.
#[derive(Debug, Error)]
#[error("cannot decode {media_type} image: {source}")]
pub struct DecodeError {
    pub media_type: MediaType,
    #[source]
    pub source: ImageError,
}

/// Row-major `(H, W, C)` tensor of `f32` values in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    pub const SHAPE: [usize; 3] = [HEIGHT, WIDTH, CHANNELS];

    fn from_rgb(image: &RgbImage) -> Self {
        debug_assert_eq!(image.dimensions(), (SIDE, SIDE));

        let data = image
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();

        NormalizedTensor { data }
    }

    pub fn shape(&self) -> [usize; 3] {
        Self::SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value at `(row, col, channel)`, `None` outside the 150x150x3 shape.
    pub fn get(&self, row: usize, col: usize, channel: usize) -> Option<f32> {
        if row >= HEIGHT || col >= WIDTH || channel >= CHANNELS {
            return None;
        }
        self.data.get((row * WIDTH + col) * CHANNELS + channel).copied()
    }
}

/// A resized upload together with its tensor form.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    image: RgbImage,
    tensor: NormalizedTensor,
}

impl NormalizedImage {
    /// The 150x150 RGB image the tensor was built from.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn tensor(&self) -> &NormalizedTensor {
        &self.tensor
    }
}

/// Decode `data` as `media_type`, flatten it to RGB and resize it to 150x150.
pub fn normalize(data: &[u8], media_type: MediaType) -> Result<NormalizedImage, DecodeError> {
    let t = Timer::start("Load image from memory");

    let decoded = image::load_from_memory_with_format(data, media_type.image_format())
        .map_err(|source| DecodeError { media_type, source })?;

    t.stop();

    let t = Timer::start("Resizing image");

    let rgb = flatten_to_rgb(&decoded);
    let image = imageops::resize(&rgb, SIDE, SIDE, FilterType::Triangle);
    let tensor = NormalizedTensor::from_rgb(&image);

    t.stop();

    Ok(NormalizedImage { image, tensor })
}

// Grayscale is replicated across R, G and B by the conversion itself; any
// image carrying alpha is laid over opaque white first.
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if image.color().has_alpha() {
        composite_over_white(&image.to_rgba8())
    } else {
        image.to_rgb8()
    }
}

fn composite_over_white(rgba: &RgbaImage) -> RgbImage {
    let (width, height) = rgba.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        Rgb([blend(r, a), blend(g, a), blend(b, a)])
    })
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (u32::from(channel), u32::from(alpha));
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}
