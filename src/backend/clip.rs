//! CLIP zero-shot classification on candle

use anyhow::{anyhow, ensure, Context, Error, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::tokio::Api;
use image::{imageops, imageops::FilterType, RgbImage};
use tokenizers::Tokenizer;

use crate::backend::device::select_device;
use crate::backend::traits::Classifier;
use crate::backend::util::image_to_tensor;
use crate::config::{ClipConfig as ClipSettings, DeviceConfig};

pub struct ClipClassifier {
    device: Device,
    model: ClipModel,
    image_size: usize,
    tokenizer: Tokenizer,
    pad_id: u32,
}

impl ClipClassifier {
    pub async fn load(config: &ClipSettings, device_config: &DeviceConfig) -> Result<Self> {
        let device = select_device(device_config).context("failed to set up device")?;
        let repo = Api::new()?.model(config.model_id.clone());
        let model_file = repo
            .get("model.safetensors")
            .await
            .context("failed to get CLIP model file")?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .await
            .context("failed to get CLIP tokenizer")?;

        tokio::task::spawn_blocking(move || {
            let clip_config = ClipConfig::vit_base_patch32();
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[model_file], DType::F32, &device)
                    .context("failed to build CLIP var builder")?
            };
            let model = ClipModel::new(vb, &clip_config).context("failed to load CLIP model")?;
            let tokenizer = Tokenizer::from_file(tokenizer_file)
                .map_err(Error::msg)
                .context("failed to load CLIP tokenizer")?;
            let pad_id = *tokenizer
                .get_vocab(true)
                .get("<|endoftext|>")
                .ok_or_else(|| anyhow!("CLIP tokenizer has no pad token"))?;

            Ok::<_, Error>(ClipClassifier {
                device,
                model,
                image_size: clip_config.image_size,
                tokenizer,
                pad_id,
            })
        })
        .await?
    }

    fn pixel_values(&self, image: &RgbImage) -> Result<Tensor> {
        let size = self.image_size as u32;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let pixels = image_to_tensor(&resized, &self.device)?
            .to_dtype(DType::F32)?
            .affine(2. / 255., -1.)?
            .unsqueeze(0)?;
        Ok(pixels)
    }

    fn input_ids(&self, labels: &[String]) -> Result<Tensor> {
        let mut tokens = Vec::with_capacity(labels.len());
        for label in labels {
            let encoding = self.tokenizer.encode(label.as_str(), true).map_err(Error::msg)?;
            tokens.push(encoding.get_ids().to_vec());
        }

        let max_len = tokens.iter().map(Vec::len).max().unwrap_or(0);
        let flat = tokens
            .into_iter()
            .flat_map(|mut ids| {
                ids.resize(max_len, self.pad_id);
                ids
            })
            .collect::<Vec<_>>();
        Ok(Tensor::from_vec(flat, (labels.len(), max_len), &self.device)?)
    }
}

impl Classifier for ClipClassifier {
    fn classify(&self, image: &RgbImage, labels: &[String]) -> Result<Vec<f32>> {
        ensure!(!labels.is_empty(), "at least one label is required");

        let pixel_values = self.pixel_values(image)?;
        let input_ids = self.input_ids(labels)?;
        let (_logits_per_text, logits_per_image) = self.model.forward(&pixel_values, &input_ids)?;

        let probs = candle_nn::ops::softmax(&logits_per_image, 1)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(probs)
    }
}
