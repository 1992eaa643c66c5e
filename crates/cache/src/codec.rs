//! PNG encoding of page bitmaps for persistence and capture.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

use crate::CacheError;

/// File extension of encoded page blobs
pub const BLOB_EXTENSION: &str = "png";

/// Encode RGBA pixels as a PNG blob
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CacheError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Decode a PNG blob back into RGBA pixels
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CacheError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}
