//! Encoded images for tests.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

pub fn encode(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("test image encodes");
    bytes
}

pub fn jpeg(image: DynamicImage) -> Vec<u8> {
    encode(image, ImageOutputFormat::Jpeg(90))
}

pub fn png(image: DynamicImage) -> Vec<u8> {
    encode(image, ImageOutputFormat::Png)
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn rgb_jpeg(width: u32, height: u32) -> Vec<u8> {
    jpeg(gradient(width, height))
}

pub fn rgb_png(width: u32, height: u32) -> Vec<u8> {
    png(gradient(width, height))
}
