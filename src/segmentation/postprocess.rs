//! Mask post-processing for both segmentation modes

use image::GrayImage;
use serde::Serialize;

use crate::backend::traits::{PredictedMask, RawMask};

/// Most candidates kept from automatic mask generation
pub const MAX_AUTOMATIC_MASKS: usize = 10;

/// Axis-aligned box in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Clip the box so it lies inside a `width` x `height` image
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}

/// A filtered, labelled segmentation result
#[derive(Debug, Clone)]
pub struct MaskCandidate {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub area: u64,
    pub label: String,
    pub mask: Option<GrayImage>,
}

/// Automatic mode: keep the first `MAX_AUTOMATIC_MASKS` candidates in model
/// order, drop those under `threshold`, label by pre-filter rank.
pub fn automatic(raw: Vec<RawMask>, threshold: f32, width: u32, height: u32) -> Vec<MaskCandidate> {
    raw.into_iter()
        .take(MAX_AUTOMATIC_MASKS)
        .enumerate()
        .filter(|(_, candidate)| candidate.confidence >= threshold)
        .map(|(index, candidate)| {
            let [x, y, w, h] = candidate.bbox;
            MaskCandidate {
                bbox: BoundingBox {
                    x,
                    y,
                    width: w,
                    height: h,
                }
                .clamp_to(width, height),
                confidence: candidate.confidence,
                area: candidate.area,
                label: format!("Object {}", index + 1),
                mask: candidate.mask,
            }
        })
        .collect()
}

/// Guided mode: keep every prediction at or above `threshold` that has at
/// least one foreground pixel. Box and area come from the mask itself.
pub fn guided(predictions: Vec<PredictedMask>, threshold: f32) -> Vec<MaskCandidate> {
    predictions
        .into_iter()
        .enumerate()
        .filter(|(_, prediction)| prediction.score >= threshold)
        .filter_map(|(index, prediction)| {
            let bbox = mask_bbox(&prediction.mask)?;
            let area = foreground_area(&prediction.mask);
            Some(MaskCandidate {
                bbox,
                confidence: prediction.score,
                area,
                label: format!("Mask {}", index + 1),
                mask: Some(prediction.mask),
            })
        })
        .collect()
}

/// Tight box around the foreground pixels, `None` for an empty mask.
///
/// Width and height are `last - first` column and row.
pub fn mask_bbox(mask: &GrayImage) -> Option<BoundingBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    bounds.map(|(x0, y0, x1, y1)| BoundingBox {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

fn foreground_area(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|pixel| pixel.0[0] > 0).count() as u64
}
