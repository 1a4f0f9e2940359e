//! Registry of lazily loaded capability handles

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::backend::traits::{
    Capability, CapabilityState, Classifier, ModelLoader, Segmenter, TextToImage,
};
use crate::error::{AppError, Result};

/// Final outcome of the single load attempt; errors keep the failure message
type LoadOutcome<T> = std::result::Result<Arc<T>, String>;

/// One capability handle. The cell is written at most once.
struct Slot<T: ?Sized> {
    capability: Capability,
    cell: Arc<OnceCell<LoadOutcome<T>>>,
    started: AtomicBool,
}

impl<T> Slot<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn new(capability: Capability) -> Self {
        Self {
            capability,
            cell: Arc::new(OnceCell::new()),
            started: AtomicBool::new(false),
        }
    }

    fn state(&self) -> CapabilityState {
        match self.cell.get() {
            Some(Ok(_)) => CapabilityState::Loaded,
            Some(Err(_)) => CapabilityState::LoadFailed,
            None if self.started.load(Ordering::Acquire) => CapabilityState::Loading,
            None => CapabilityState::Unloaded,
        }
    }

    /// Return the cached outcome, or run (or join) the one load attempt.
    ///
    /// The attempt runs on its own task so a caller that goes away does not
    /// abandon it half-way and hand the initialisation to the next caller.
    async fn get_or_load<F, Fut>(&self, load_fn: F) -> LoadOutcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Arc<T>>> + Send + 'static,
    {
        if let Some(outcome) = self.cell.get() {
            return outcome.clone();
        }

        self.started.store(true, Ordering::Release);
        let cell = self.cell.clone();
        let capability = self.capability;
        let task = tokio::spawn(async move {
            cell.get_or_init(|| load(capability, load_fn))
                .await
                .clone()
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(format!("{} load task failed: {}", capability, e)),
        }
    }
}

async fn load<T, F, Fut>(capability: Capability, load_fn: F) -> LoadOutcome<T>
where
    T: ?Sized + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Arc<T>>> + Send + 'static,
{
    info!(capability = %capability, "Loading model");
    let started = Instant::now();

    match tokio::spawn(async move { load_fn().await }).await {
        Ok(Ok(handle)) => {
            info!(
                capability = %capability,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Model loaded"
            );
            Ok(handle)
        }
        Ok(Err(e)) => {
            let message = format!("{:#}", e);
            error!(capability = %capability, error = %message, "Failed to load model");
            Err(message)
        }
        Err(e) => {
            let message = format!("model loader panicked: {}", e);
            error!(capability = %capability, error = %message, "Failed to load model");
            Err(message)
        }
    }
}

/// Holds one handle per capability and loads each at most once.
///
/// A failed load is final for the lifetime of the process; restarting the
/// service is the only way to retry.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    text2img: Slot<dyn TextToImage>,
    segmentation: Slot<dyn Segmenter>,
    classification: Slot<dyn Classifier>,
}

impl ModelRegistry {
    /// Create an empty registry; nothing is loaded until first use or `preload_all`
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            text2img: Slot::new(Capability::TextToImage),
            segmentation: Slot::new(Capability::Segmentation),
            classification: Slot::new(Capability::Classification),
        }
    }

    /// Text-to-image handle, loading it on first access
    pub async fn text2img(&self) -> Result<Arc<dyn TextToImage>> {
        let loader = self.loader.clone();
        let outcome = self
            .text2img
            .get_or_load(move || async move { loader.load_text2img().await })
            .await;
        resolve(Capability::TextToImage, outcome)
    }

    /// Segmentation handle, loading it on first access
    pub async fn segmentation(&self) -> Result<Arc<dyn Segmenter>> {
        let loader = self.loader.clone();
        let outcome = self
            .segmentation
            .get_or_load(move || async move { loader.load_segmentation().await })
            .await;
        resolve(Capability::Segmentation, outcome)
    }

    /// Classification handle, loading it on first access
    pub async fn classification(&self) -> Result<Arc<dyn Classifier>> {
        let loader = self.loader.clone();
        let outcome = self
            .classification
            .get_or_load(move || async move { loader.load_classification().await })
            .await;
        resolve(Capability::Classification, outcome)
    }

    /// Make sure the capability has had its load attempt and report the result
    pub async fn ensure_loaded(&self, capability: Capability) -> CapabilityState {
        let loaded = match capability {
            Capability::TextToImage => self.text2img().await.is_ok(),
            Capability::Segmentation => self.segmentation().await.is_ok(),
            Capability::Classification => self.classification().await.is_ok(),
        };

        if loaded {
            CapabilityState::Loaded
        } else {
            CapabilityState::LoadFailed
        }
    }

    /// Load every capability concurrently. Failures are logged and recorded, never returned.
    pub async fn preload_all(&self) {
        let (text2img, segmentation, classification) = tokio::join!(
            self.ensure_loaded(Capability::TextToImage),
            self.ensure_loaded(Capability::Segmentation),
            self.ensure_loaded(Capability::Classification),
        );

        info!(
            text2img = ?text2img,
            sam = ?segmentation,
            clip = ?classification,
            "Model preload finished"
        );
    }

    /// Current state of a capability, without triggering a load
    pub fn state(&self, capability: Capability) -> CapabilityState {
        match capability {
            Capability::TextToImage => self.text2img.state(),
            Capability::Segmentation => self.segmentation.state(),
            Capability::Classification => self.classification.state(),
        }
    }

    /// Whether the capability is loaded and ready for inference
    pub fn is_available(&self, capability: Capability) -> bool {
        self.state(capability) == CapabilityState::Loaded
    }

    /// State of every capability
    pub fn snapshot(&self) -> Vec<(Capability, CapabilityState)> {
        Capability::ALL
            .iter()
            .map(|capability| (*capability, self.state(*capability)))
            .collect()
    }
}

fn resolve<T: ?Sized>(capability: Capability, outcome: LoadOutcome<T>) -> Result<Arc<T>> {
    outcome.map_err(|reason| {
        let name = match capability {
            Capability::TextToImage => "Text-to-image",
            Capability::Segmentation => "SAM",
            Capability::Classification => "CLIP",
        };
        AppError::Unavailable(format!("{} model not loaded: {}", name, reason))
    })
}
