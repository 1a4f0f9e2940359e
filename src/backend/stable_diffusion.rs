//! Stable Diffusion text-to-image on candle

use anyhow::{anyhow, ensure, Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, schedulers::Scheduler, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use image::RgbImage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::backend::device::{preferred_dtype, select_device};
use crate::backend::traits::{GenerationParams, TextToImage};
use crate::backend::util::tensor_to_image;
use crate::config::{DeviceConfig, TextToImageConfig};

const VAE_SCALE: f64 = 0.18215;

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdVersion {
    V1_5,
    V2_1,
}

impl SdVersion {
    /// Detect the family from a hub repository id
    pub fn from_model_id(model_id: &str) -> Result<Self> {
        let id = model_id.to_lowercase();
        if id.contains("stable-diffusion-2") || id.contains("sd2") {
            Ok(SdVersion::V2_1)
        } else if id.contains("stable-diffusion-v1") || id.contains("sd-v1") {
            Ok(SdVersion::V1_5)
        } else {
            Err(anyhow!("Unsupported text-to-image model: {}", model_id))
        }
    }

    fn config(
        &self,
        sliced_attention_size: Option<usize>,
        height: Option<usize>,
        width: Option<usize>,
    ) -> StableDiffusionConfig {
        match self {
            SdVersion::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, height, width),
            SdVersion::V2_1 => StableDiffusionConfig::v2_1(sliced_attention_size, height, width),
        }
    }
}

/// Loaded Stable Diffusion pipeline.
///
/// Every call builds its own scheduler and draws its own noise, so the
/// pipeline holds no per-request state.
pub struct StableDiffusion {
    device: Device,
    dtype: DType,
    version: SdVersion,
    sliced_attention_size: Option<usize>,
    tokenizer: Tokenizer,
    text_model: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

impl StableDiffusion {
    /// Fetch the weights from the hub and build the pipeline on the selected device
    pub async fn load(config: &TextToImageConfig, device_config: &DeviceConfig) -> Result<Self> {
        let version = SdVersion::from_model_id(&config.model_id)?;
        let device = select_device(device_config).context("failed to set up device")?;
        let dtype = preferred_dtype(&device, config.use_f16);
        let suffix = if dtype == DType::F16 {
            "fp16.safetensors"
        } else {
            "safetensors"
        };

        let api = Api::new()?;
        let repo = api.model(config.model_id.clone());
        let clip_weights = repo
            .get(&format!("text_encoder/model.{suffix}"))
            .await
            .context("failed to get text encoder weights")?;
        let unet_weights = repo
            .get(&format!("unet/diffusion_pytorch_model.{suffix}"))
            .await
            .context("failed to get unet weights")?;
        let vae_weights = repo
            .get(&format!("vae/diffusion_pytorch_model.{suffix}"))
            .await
            .context("failed to get vae weights")?;
        let tokenizer_file = api
            .model(config.tokenizer_repo.clone())
            .get("tokenizer.json")
            .await
            .context("failed to get tokenizer")?;

        let sliced_attention_size = config.sliced_attention_size;
        tokio::task::spawn_blocking(move || {
            let tokenizer = Tokenizer::from_file(tokenizer_file)
                .map_err(Error::msg)
                .context("failed to load tokenizer")?;
            let sd_config = version.config(sliced_attention_size, None, None);
            let text_model = stable_diffusion::build_clip_transformer(
                &sd_config.clip,
                clip_weights,
                &device,
                DType::F32,
            )
            .context("failed to load text encoder")?;
            let unet = sd_config
                .build_unet(unet_weights, &device, 4, false, dtype)
                .context("failed to load unet")?;
            let vae = sd_config
                .build_vae(vae_weights, &device, dtype)
                .context("failed to load vae")?;

            Ok::<_, Error>(StableDiffusion {
                device,
                dtype,
                version,
                sliced_attention_size,
                tokenizer,
                text_model,
                unet,
                vae,
            })
        })
        .await?
    }

    fn text_embeddings(&self, sd_config: &StableDiffusionConfig, prompt: &str) -> Result<Tensor> {
        let vocab = self.tokenizer.get_vocab(true);
        let pad_token = sd_config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *vocab
            .get(pad_token)
            .ok_or_else(|| anyhow!("tokenizer has no pad token {pad_token}"))?;

        let max_len = sd_config.clip.max_position_embeddings;
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        tokens.truncate(max_len);
        tokens.resize(max_len, pad_id);

        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.text_model.forward(&tokens)?)
    }
}

impl TextToImage for StableDiffusion {
    fn generate(&self, params: &GenerationParams) -> Result<RgbImage> {
        ensure!(
            params.width % 8 == 0 && params.height % 8 == 0,
            "width and height must be multiples of 8, got {}x{}",
            params.width,
            params.height
        );

        let sd_config = self.version.config(
            self.sliced_attention_size,
            Some(params.height),
            Some(params.width),
        );
        let mut scheduler = sd_config.build_scheduler(params.steps)?;
        let use_guidance = params.guidance > 1.0;

        let cond = self.text_embeddings(&sd_config, &params.prompt)?;
        let text_embeddings = if use_guidance {
            let uncond = self.text_embeddings(&sd_config, "")?;
            Tensor::cat(&[uncond, cond], 0)?
        } else {
            cond
        };
        let text_embeddings = text_embeddings.to_dtype(self.dtype)?;

        let seed = params.seed.unwrap_or_else(rand::random);
        let shape = (1, 4, params.height / 8, params.width / 8);
        let noise = initial_noise(seed, shape.1 * shape.2 * shape.3);
        let latents = Tensor::from_vec(noise, shape, &self.device)?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        let timesteps = scheduler.timesteps().to_vec();
        for (index, &timestep) in timesteps.iter().enumerate() {
            let model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let noise_pred = self
                .unet
                .forward(&model_input, timestep as f64, &text_embeddings)?;

            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, text) = (&chunks[0], &chunks[1]);
                (uncond + ((text - uncond)? * params.guidance)?)?
            } else {
                noise_pred
            };

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!(step = index + 1, total = timesteps.len(), "Denoising step done");
        }

        let images = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        let images = ((images.to_dtype(DType::F32)? / 2.)? + 0.5)?;
        let images = (images.clamp(0f32, 1f32)? * 255.)?.to_dtype(DType::U8)?;

        tensor_to_image(&images.i(0)?)
    }
}

/// Standard normal samples drawn from a generator seeded with `seed`.
pub fn initial_noise(seed: u64, len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| standard_normal(&mut rng)).collect()
}

fn standard_normal(rng: &mut StdRng) -> f32 {
    // Box-Muller
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}
