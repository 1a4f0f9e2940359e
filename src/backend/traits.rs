//! Common traits and types for model capabilities

use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One ML-backed function the service offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TextToImage,
    Segmentation,
    Classification,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::TextToImage,
        Capability::Segmentation,
        Capability::Classification,
    ];

    /// Name used on the wire (`/health` keys, log fields)
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TextToImage => "text2img",
            Capability::Segmentation => "sam",
            Capability::Classification => "clip",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load state of a capability handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityState {
    Unloaded,
    /// First load attempt in progress
    Loading,
    Loaded,
    LoadFailed,
}

/// Parameters for a single text-to-image generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub width: usize,
    pub height: usize,
    /// Fixed seed for reproducible output; `None` draws a fresh one
    pub seed: Option<u64>,
    pub steps: usize,
    pub guidance: f64,
}

/// Point hint for guided segmentation, in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrompt {
    pub x: f64,
    pub y: f64,
    pub foreground: bool,
}

/// Candidate produced by automatic mask generation
#[derive(Debug, Clone)]
pub struct RawMask {
    /// `[x, y, width, height]` in image pixel coordinates
    pub bbox: [u32; 4],
    pub confidence: f32,
    pub area: u64,
    pub mask: Option<GrayImage>,
}

/// Candidate produced by a point-guided prediction
#[derive(Debug, Clone)]
pub struct PredictedMask {
    /// Binary mask at image resolution; any non-zero pixel is foreground
    pub mask: GrayImage,
    pub score: f32,
}

/// Text-to-image synthesis
pub trait TextToImage: Send + Sync {
    fn generate(&self, params: &GenerationParams) -> anyhow::Result<RgbImage>;
}

/// Promptable segmentation
pub trait Segmenter: Send + Sync {
    /// Propose regions without hints, in the order the model produces them
    fn generate_masks(&self, image: &RgbImage) -> anyhow::Result<Vec<RawMask>>;

    /// Refine regions around the given points (multimask output)
    fn predict(&self, image: &RgbImage, points: &[PointPrompt])
        -> anyhow::Result<Vec<PredictedMask>>;
}

/// Zero-shot image classification
pub trait Classifier: Send + Sync {
    /// Probability for each label, in label order
    fn classify(&self, image: &RgbImage, labels: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Acquires the model resources behind each capability
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load_text2img(&self) -> anyhow::Result<Arc<dyn TextToImage>>;

    async fn load_segmentation(&self) -> anyhow::Result<Arc<dyn Segmenter>>;

    async fn load_classification(&self) -> anyhow::Result<Arc<dyn Classifier>>;
}
