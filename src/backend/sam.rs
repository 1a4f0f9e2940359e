//! Segment Anything on candle

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::segment_anything::sam::{self, Sam};
use hf_hub::api::tokio::Api;
use image::RgbImage;
use std::path::PathBuf;
use tracing::debug;

use crate::backend::device::select_device;
use crate::backend::traits::{PointPrompt, PredictedMask, RawMask, Segmenter};
use crate::backend::util::{image_to_tensor, resize_longest_side, resize_mask, tensor_to_mask};
use crate::config::{DeviceConfig, SamConfig};

/// Crop overlap used by automatic mask generation
const CROP_OVERLAP_RATIO: f64 = 512. / 1500.;

/// Image encoder sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamVariant {
    VitT,
    VitB,
    VitL,
    VitH,
}

impl SamVariant {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "vit_t" | "tiny" => Ok(SamVariant::VitT),
            "vit_b" => Ok(SamVariant::VitB),
            "vit_l" => Ok(SamVariant::VitL),
            "vit_h" => Ok(SamVariant::VitH),
            other => Err(anyhow!(
                "Unknown SAM model type '{}'. Must be one of vit_t, vit_b, vit_l, vit_h",
                other
            )),
        }
    }

    /// Checkpoint published on the hub, if any
    fn hub_file(&self) -> Option<&'static str> {
        match self {
            SamVariant::VitT => Some("mobile_sam-tiny-vitt.safetensors"),
            SamVariant::VitB => Some("sam_vit_b_01ec64.safetensors"),
            SamVariant::VitL | SamVariant::VitH => None,
        }
    }

    fn build(&self, vb: VarBuilder) -> candle_core::Result<Sam> {
        match self {
            SamVariant::VitT => Sam::new_tiny(vb),
            SamVariant::VitB => Sam::new(768, 12, 12, &[2, 5, 8, 11], vb),
            SamVariant::VitL => Sam::new(1024, 24, 16, &[5, 11, 17, 23], vb),
            SamVariant::VitH => Sam::new(1280, 32, 16, &[7, 15, 23, 31], vb),
        }
    }
}

/// Loaded SAM model.
///
/// Each call embeds its own input image, so concurrent calls never share a
/// half-configured predictor.
pub struct SegmentAnything {
    device: Device,
    model: Sam,
    points_per_side: usize,
}

impl SegmentAnything {
    /// Resolve the checkpoint (local path or hub) and build the model
    pub async fn load(config: &SamConfig, device_config: &DeviceConfig) -> Result<Self> {
        let variant = SamVariant::from_name(&config.model_type)?;
        let device = select_device(device_config).context("failed to set up device")?;

        let weights = match &config.checkpoint {
            Some(path) => PathBuf::from(path),
            None => {
                let file = variant.hub_file().ok_or_else(|| {
                    anyhow!(
                        "SAM model type {} needs a local checkpoint (models.sam.checkpoint)",
                        config.model_type
                    )
                })?;
                Api::new()?
                    .model(config.hub_repo.clone())
                    .get(file)
                    .await
                    .context("failed to get SAM weights")?
            }
        };

        let points_per_side = config.points_per_side;
        tokio::task::spawn_blocking(move || {
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                    .context("failed to build SAM var builder")?
            };
            let model = variant.build(vb).context("failed to load SAM model")?;
            Ok::<_, anyhow::Error>(SegmentAnything {
                device,
                model,
                points_per_side,
            })
        })
        .await?
    }

    /// Model input: long side resized to the encoder resolution
    fn prepare(&self, image: &RgbImage) -> Result<(Tensor, u32, u32)> {
        let resized = resize_longest_side(image, sam::IMAGE_SIZE as u32);
        let (width, height) = resized.dimensions();
        Ok((image_to_tensor(&resized, &self.device)?, width, height))
    }
}

impl Segmenter for SegmentAnything {
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<RawMask>> {
        let (width, height) = image.dimensions();
        let (input, input_w, input_h) = self.prepare(image)?;
        let scale_x = width as f32 / input_w as f32;
        let scale_y = height as f32 / input_h as f32;

        let bboxes = self
            .model
            .generate_masks(&input, self.points_per_side, 0, CROP_OVERLAP_RATIO, 1)?;
        debug!(count = bboxes.len(), "Automatic mask generation done");

        bboxes
            .into_iter()
            .map(|bbox| {
                let data = bbox.data.squeeze(0).unwrap_or(bbox.data);
                let mask = resize_mask(&tensor_to_mask(&data)?, width, height);
                let area = mask.pixels().filter(|p| p.0[0] > 0).count() as u64;

                let x = (bbox.xmin.max(0.0) * scale_x) as u32;
                let y = (bbox.ymin.max(0.0) * scale_y) as u32;
                let w = ((bbox.xmax - bbox.xmin).max(0.0) * scale_x) as u32;
                let h = ((bbox.ymax - bbox.ymin).max(0.0) * scale_y) as u32;

                Ok(RawMask {
                    bbox: [x, y, w, h],
                    confidence: bbox.confidence,
                    area,
                    mask: Some(mask),
                })
            })
            .collect()
    }

    fn predict(&self, image: &RgbImage, points: &[PointPrompt]) -> Result<Vec<PredictedMask>> {
        let (width, height) = image.dimensions();
        let (input, _, _) = self.prepare(image)?;

        // The model takes coordinates relative to the image size
        let prompts = points
            .iter()
            .map(|p| (p.x / width as f64, p.y / height as f64, p.foreground))
            .collect::<Vec<_>>();

        let (masks, iou_predictions) = self.model.forward(&input, &prompts, true)?;
        let scores = iou_predictions
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        let masks = if masks.rank() == 4 {
            masks.squeeze(0)?
        } else {
            masks
        };

        let count = masks.dim(0)?;
        let mut predictions = Vec::with_capacity(count);
        for (index, score) in scores.into_iter().enumerate().take(count) {
            let mask = tensor_to_mask(&masks.get(index)?)?;
            predictions.push(PredictedMask {
                mask: resize_mask(&mask, width, height),
                score,
            });
        }
        Ok(predictions)
    }
}
