//! Request and response bodies of the HTTP API

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::backend::traits::{CapabilityState, GenerationParams, PointPrompt};
use crate::error::{AppError, Result};
use crate::queue::GateStats;
use crate::segmentation::BoundingBox;

pub const DEFAULT_SIZE: usize = 512;
pub const DEFAULT_STEPS: usize = 50;
pub const DEFAULT_GUIDANCE: f64 = 7.5;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Largest accepted output side
pub const MAX_DIMENSION: usize = 2048;

/// Most denoising steps per request, the scheduler's training timestep count
pub const MAX_STEPS: usize = 1000;

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub seed: Option<u64>,
    pub num_inference_steps: Option<usize>,
    pub guidance_scale: Option<f64>,
}

impl GenerateRequest {
    /// Apply defaults and check every field
    pub fn into_params(self) -> Result<GenerationParams> {
        let prompt = required(self.prompt, "Prompt")?;
        if prompt.trim().is_empty() {
            return Err(AppError::Validation("Prompt is required".into()));
        }

        let width = self.width.unwrap_or(DEFAULT_SIZE);
        let height = self.height.unwrap_or(DEFAULT_SIZE);
        for (name, value) in [("width", width), ("height", height)] {
            if value == 0 || value > MAX_DIMENSION {
                return Err(AppError::Validation(format!(
                    "{name} must be between 1 and {MAX_DIMENSION}"
                )));
            }
        }

        let steps = self.num_inference_steps.unwrap_or(DEFAULT_STEPS);
        if steps == 0 || steps > MAX_STEPS {
            return Err(AppError::Validation(format!(
                "num_inference_steps must be between 1 and {MAX_STEPS}"
            )));
        }

        let guidance = self.guidance_scale.unwrap_or(DEFAULT_GUIDANCE);
        if !guidance.is_finite() {
            return Err(AppError::Validation("guidance_scale must be finite".into()));
        }

        Ok(GenerationParams {
            prompt,
            width,
            height,
            seed: self.seed,
            steps,
            guidance,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub image_base64: String,
    pub image_url: Option<String>,
    pub seed: u64,
    pub prompt: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SegmentRequest {
    pub image: Option<String>,
    pub points: Option<Vec<[f64; 2]>>,
    pub labels: Option<Vec<i64>>,
    pub threshold: Option<f32>,
}

/// A segmentation request that passed validation
#[derive(Debug)]
pub struct SegmentJob {
    pub image: String,
    /// `None` selects automatic mode
    pub points: Option<Vec<PointPrompt>>,
    pub threshold: f32,
}

impl SegmentRequest {
    pub fn validate(self) -> Result<SegmentJob> {
        let image = required(self.image, "Image")?;

        let threshold = self.threshold.unwrap_or(DEFAULT_THRESHOLD);
        if !threshold.is_finite() {
            return Err(AppError::Validation("threshold must be finite".into()));
        }

        let points = match self.points {
            Some(points) if !points.is_empty() => Some(points),
            _ => None,
        };
        let points = match points {
            None => None,
            Some(points) => {
                let labels = match self.labels {
                    Some(labels) if !labels.is_empty() => labels,
                    _ => vec![1; points.len()],
                };
                if labels.len() != points.len() {
                    return Err(AppError::Validation(format!(
                        "labels has {} entries but points has {}",
                        labels.len(),
                        points.len()
                    )));
                }

                let prompts = points
                    .into_iter()
                    .zip(labels)
                    .map(|([x, y], label)| match label {
                        0 | 1 if x.is_finite() && y.is_finite() => Ok(PointPrompt {
                            x,
                            y,
                            foreground: label == 1,
                        }),
                        0 | 1 => Err(AppError::Validation(
                            "point coordinates must be finite".into(),
                        )),
                        other => Err(AppError::Validation(format!(
                            "labels must be 0 or 1, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(prompts)
            }
        };

        Ok(SegmentJob {
            image,
            points,
            threshold,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MaskResponse {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub area: u64,
    pub predicted_label: String,
    pub mask_base64: Option<String>,
    pub polygon_svg: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub masks: Vec<MaskResponse>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct InpaintRequest {
    pub image: Option<String>,
    pub mask: Option<String>,
    pub prompt: Option<String>,
}

impl InpaintRequest {
    /// Returns the image to echo back
    pub fn validate(self) -> Result<String> {
        let image = required(self.image, "Image")?;
        required(self.mask, "Mask")?;
        required(self.prompt, "Prompt")?;
        Ok(image)
    }
}

#[derive(Debug, Serialize)]
pub struct InpaintResponse {
    pub image_base64: String,
    pub image_url: Option<String>,
    pub placeholder: bool,
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassifyRequest {
    pub image: Option<String>,
    pub labels: Option<Vec<String>>,
}

impl ClassifyRequest {
    pub fn validate(self) -> Result<(String, Vec<String>)> {
        let image = required(self.image, "Image")?;
        let labels = self.labels.unwrap_or_default();
        if labels.is_empty() {
            return Err(AppError::Validation("labels must not be empty".into()));
        }
        if labels.iter().any(|label| label.trim().is_empty()) {
            return Err(AppError::Validation("labels must not be blank".into()));
        }
        Ok((image, labels))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub predictions: Vec<Prediction>,
    pub best: Option<Prediction>,
}

#[derive(Debug, Serialize)]
pub struct ModelsLoaded {
    pub text2img: bool,
    pub sam: bool,
    pub clip: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_loaded: ModelsLoaded,
    pub model_states: BTreeMap<&'static str, CapabilityState>,
    pub inference: GateStats,
}
