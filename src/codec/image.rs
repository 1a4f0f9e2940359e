//! Conversion between transport strings and in-memory rasters

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;

use crate::codec::base64;
use crate::error::{AppError, Result};

/// Decode a (data-URL or bare) base64 image into an RGB raster.
///
/// Grayscale, alpha and 16-bit sources are all normalised to 8-bit RGB.
pub fn decode_image(encoded: &str) -> Result<RgbImage> {
    let bytes = base64::decode(encoded)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| AppError::Decode(format!("unreadable image: {}", e)))?;
    Ok(image.to_rgb8())
}

/// Encode a raster as a PNG data URL
pub fn encode_image(image: &RgbImage) -> Result<String> {
    let bytes = encode_png(&DynamicImage::ImageRgb8(image.clone()))?;
    Ok(base64::create_data_url(&bytes, "png"))
}

/// Encode a binary mask as a grayscale PNG data URL
pub fn encode_mask(mask: &GrayImage) -> Result<String> {
    let bytes = encode_png(&DynamicImage::ImageLuma8(mask.clone()))?;
    Ok(base64::create_data_url(&bytes, "png"))
}

/// Serialize an image to PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::Internal(format!("failed to encode PNG: {}", e)))?;
    Ok(bytes)
}
