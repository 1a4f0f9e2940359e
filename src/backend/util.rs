use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use image::{imageops, imageops::FilterType, GrayImage, RgbImage};

/// Converts an RGB image into a u8 tensor with shape (3, height, width).
pub fn image_to_tensor(image: &RgbImage, device: &Device) -> Result<Tensor> {
    let (width, height) = image.dimensions();
    let data = image.as_raw().clone();
    let tensor = Tensor::from_vec(data, (height as usize, width as usize, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_device(device)?;
    Ok(tensor)
}

/// Converts a tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<RgbImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img
        .to_device(&Device::Cpu)?
        .to_dtype(DType::U8)?
        .permute((1, 2, 0))?
        .flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    RgbImage::from_raw(width as u32, height as u32, pixels)
        .context("error converting tensor to image buffer")
}

/// Converts a (height, width) tensor into a 0/255 mask; any positive value is foreground.
pub fn tensor_to_mask(mask: &Tensor) -> Result<GrayImage> {
    let (height, width) = mask.dims2()?;
    let pixels = mask
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?
        .into_iter()
        .map(|v| if v > 0.0 { 255u8 } else { 0u8 })
        .collect::<Vec<_>>();
    GrayImage::from_raw(width as u32, height as u32, pixels)
        .context("error converting tensor to mask buffer")
}

/// Dimensions that bring the longest side of `(width, height)` to `target`.
pub fn fit_longest_side(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width >= height {
        let h = ((target as u64 * height as u64) / width.max(1) as u64).max(1) as u32;
        (target, h)
    } else {
        let w = ((target as u64 * width as u64) / height.max(1) as u64).max(1) as u32;
        (w, target)
    }
}

/// Resize an image so its longest side is `target` pixels.
pub fn resize_longest_side(image: &RgbImage, target: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = fit_longest_side(width, height, target);
    if (w, h) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, w, h, FilterType::CatmullRom)
}

/// Nearest-neighbour resize of a mask back to image resolution.
pub fn resize_mask(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Nearest)
}
