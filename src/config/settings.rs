//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for JSON bodies; base64 images are large
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Model configuration for every capability
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Start loading every capability in the background at startup
    #[serde(default = "default_true")]
    pub preload: bool,
    #[serde(default)]
    pub text2img: TextToImageConfig,
    #[serde(default)]
    pub sam: SamConfig,
    #[serde(default)]
    pub clip: ClipConfig,
}

fn default_true() -> bool {
    true
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            preload: true,
            text2img: TextToImageConfig::default(),
            sam: SamConfig::default(),
            clip: ClipConfig::default(),
        }
    }
}

/// Stable Diffusion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextToImageConfig {
    #[serde(default = "default_text2img_model")]
    pub model_id: String,
    #[serde(default = "default_clip_model")]
    pub tokenizer_repo: String,
    /// Use half precision weights when running on an accelerator
    #[serde(default = "default_true")]
    pub use_f16: bool,
    #[serde(default)]
    pub sliced_attention_size: Option<usize>,
}

fn default_text2img_model() -> String {
    "stabilityai/stable-diffusion-2-1".to_string()
}

fn default_clip_model() -> String {
    "openai/clip-vit-base-patch32".to_string()
}

impl Default for TextToImageConfig {
    fn default() -> Self {
        Self {
            model_id: default_text2img_model(),
            tokenizer_repo: default_clip_model(),
            use_f16: true,
            sliced_attention_size: None,
        }
    }
}

/// Segment Anything configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamConfig {
    /// One of `vit_b`, `vit_l`, `vit_h`, `vit_t`
    #[serde(default = "default_sam_model_type")]
    pub model_type: String,
    /// Local safetensors checkpoint; fetched from `hub_repo` when unset
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(default = "default_sam_hub_repo")]
    pub hub_repo: String,
    /// Grid density used by automatic mask generation
    #[serde(default = "default_points_per_side")]
    pub points_per_side: usize,
}

fn default_sam_model_type() -> String {
    "vit_b".to_string()
}

fn default_sam_hub_repo() -> String {
    "lmz/candle-sam".to_string()
}

fn default_points_per_side() -> usize {
    32
}

impl Default for SamConfig {
    fn default() -> Self {
        Self {
            model_type: default_sam_model_type(),
            checkpoint: None,
            hub_repo: default_sam_hub_repo(),
            points_per_side: default_points_per_side(),
        }
    }
}

/// CLIP configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClipConfig {
    #[serde(default = "default_clip_model")]
    pub model_id: String,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            model_id: default_clip_model(),
        }
    }
}

/// Device placement configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Never use an accelerator, even when one is present
    #[serde(default)]
    pub cpu: bool,
    #[serde(default)]
    pub ordinal: usize,
}

/// Inference scheduling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    /// Heavy inferences allowed to run at the same time on the device
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Storage configuration for generated images
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_storage_path")]
    pub base_path: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_storage_path() -> String {
    "./generated_images".to_string()
}

fn default_url_prefix() -> String {
    "http://localhost:5000/images".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_path: default_storage_path(),
            url_prefix: default_url_prefix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Flat variable names understood for compatibility with existing deployments
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PYTHON_AI_PORT", "server.port"),
    ("TEXT2IMG_MODEL", "models.text2img.model_id"),
    ("SAM_MODEL_TYPE", "models.sam.model_type"),
    ("SAM_CHECKPOINT", "models.sam.checkpoint"),
];

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load settings, resolving legacy variables through `lookup`
    pub fn load_with_env<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (prefixed with AI_SERVICE__)
            .add_source(
                Environment::with_prefix("AI_SERVICE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = apply_legacy_env(builder, lookup)?
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        if self.inference.max_concurrent == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "inference.max_concurrent must be at least 1".to_string(),
            )));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "Invalid log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            ))));
        }

        Ok(())
    }
}

fn apply_legacy_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in LEGACY_ENV {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        builder = builder.set_override_option(*key, value)?;
    }
    Ok(builder)
}
