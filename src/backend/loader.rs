//! Production model loader backed by candle

use async_trait::async_trait;
use std::sync::Arc;

use crate::backend::clip::ClipClassifier;
use crate::backend::sam::SegmentAnything;
use crate::backend::stable_diffusion::StableDiffusion;
use crate::backend::traits::{Classifier, ModelLoader, Segmenter, TextToImage};
use crate::config::{DeviceConfig, ModelsConfig};

/// Loads every capability from the Hugging Face hub (or local checkpoints)
pub struct CandleLoader {
    models: ModelsConfig,
    device: DeviceConfig,
}

impl CandleLoader {
    pub fn new(models: ModelsConfig, device: DeviceConfig) -> Self {
        Self { models, device }
    }
}

#[async_trait]
impl ModelLoader for CandleLoader {
    async fn load_text2img(&self) -> anyhow::Result<Arc<dyn TextToImage>> {
        let model = StableDiffusion::load(&self.models.text2img, &self.device).await?;
        Ok(Arc::new(model))
    }

    async fn load_segmentation(&self) -> anyhow::Result<Arc<dyn Segmenter>> {
        let model = SegmentAnything::load(&self.models.sam, &self.device).await?;
        Ok(Arc::new(model))
    }

    async fn load_classification(&self) -> anyhow::Result<Arc<dyn Classifier>> {
        let model = ClipClassifier::load(&self.models.clip, &self.device).await?;
        Ok(Arc::new(model))
    }
}
