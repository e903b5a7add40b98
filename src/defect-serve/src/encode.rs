use std::io::Cursor;

use image::{ImageError, ImageOutputFormat, RgbImage};

use crate::Timer;

/// Quality used when re-compressing the resized upload.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Re-encode `image` as JPEG and wrap the bytes in standard base64.
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, ImageError> {
    let t = Timer::start("Encoding image");

    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(quality))?;
    let encoded = base64::encode(&buf);

    t.stop();

    Ok(encoded)
}
