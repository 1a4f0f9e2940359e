//! Canvas AI Service
//!
//! HTTP service exposing text-to-image generation, Segment Anything
//! segmentation and CLIP classification, with models loaded lazily on
//! candle and inference bounded by a device-wide gate.

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod api;
pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod queue;
pub mod segmentation;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::ModelRegistry;
use codec::ImageStore;
use queue::InferenceGate;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: config::Settings,
    pub registry: Arc<ModelRegistry>,
    pub gate: InferenceGate,
    pub store: Option<ImageStore>,
}

impl AppState {
    /// Build the state around an existing registry
    pub fn new(settings: config::Settings, registry: Arc<ModelRegistry>) -> Self {
        let gate = InferenceGate::new(settings.inference.max_concurrent);
        let store = ImageStore::from_config(&settings.storage);
        Self {
            settings,
            registry,
            gate,
            store,
        }
    }
}
