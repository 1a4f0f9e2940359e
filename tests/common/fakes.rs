//! In-memory model fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use canvas_ai_service::{
    api,
    backend::{
        traits::{
            Capability, Classifier, GenerationParams, ModelLoader, PointPrompt, PredictedMask,
            RawMask, Segmenter, TextToImage,
        },
        ModelRegistry,
    },
    codec,
    config::Settings,
    AppState,
};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a fake load attempt does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehaviour {
    Succeed,
    Fail,
    Panic,
}

/// Text-to-image fake: pixels are a pure function of the seed
#[derive(Default)]
pub struct FakeGenerator {
    pub work: Duration,
    pub fail_with: Option<String>,
    pub panic: bool,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeGenerator {
    /// Highest number of overlapping `generate` calls seen
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextToImage for FakeGenerator {
    fn generate(&self, params: &GenerationParams) -> anyhow::Result<RgbImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(self.work);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panic {
            panic!("generator exploded");
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let image = RgbImage::from_fn(params.width as u32, params.height as u32, |_, _| {
            Rgb([rng.gen(), rng.gen(), rng.gen()])
        });
        Ok(image)
    }
}

/// Segmenter fake returning canned candidates
#[derive(Default)]
pub struct FakeSegmenter {
    pub automatic: Vec<RawMask>,
    pub guided: Vec<(f32, Option<[u32; 4]>)>,
}

impl FakeSegmenter {
    /// `count` automatic candidates with confidence falling from 0.99 in steps of 0.05
    pub fn with_ranked_candidates(count: usize, width: u32, height: u32) -> Self {
        let automatic = (0..count)
            .map(|i| RawMask {
                bbox: [i as u32 * 10, i as u32 * 10, width, height],
                confidence: 0.99 - 0.05 * i as f32,
                area: 100,
                mask: None,
            })
            .collect();
        Self {
            automatic,
            guided: Vec::new(),
        }
    }
}

impl Segmenter for FakeSegmenter {
    fn generate_masks(&self, _image: &RgbImage) -> anyhow::Result<Vec<RawMask>> {
        Ok(self.automatic.clone())
    }

    fn predict(&self, image: &RgbImage, _points: &[PointPrompt]) -> anyhow::Result<Vec<PredictedMask>> {
        let (width, height) = image.dimensions();
        let predictions = self
            .guided
            .iter()
            .map(|(score, rect)| {
                let mask = GrayImage::from_fn(width, height, |x, y| match rect {
                    Some([x0, y0, x1, y1]) if (*x0..=*x1).contains(&x) && (*y0..=*y1).contains(&y) => {
                        Luma([255])
                    }
                    _ => Luma([0]),
                });
                PredictedMask {
                    mask,
                    score: *score,
                }
            })
            .collect();
        Ok(predictions)
    }
}

/// Classifier fake favouring labels that contain "cat"
pub struct FakeClassifier;

impl Classifier for FakeClassifier {
    fn classify(&self, _image: &RgbImage, labels: &[String]) -> anyhow::Result<Vec<f32>> {
        let raw = labels
            .iter()
            .map(|label| if label.contains("cat") { 3.0 } else { 1.0 })
            .collect::<Vec<f32>>();
        let total: f32 = raw.iter().sum();
        Ok(raw.into_iter().map(|v| v / total).collect())
    }
}

/// Loader handing out the fakes above, counting every attempt
pub struct FakeLoader {
    behaviour: [LoadBehaviour; 3],
    delay: Duration,
    attempts: [AtomicUsize; 3],
    pub generator: Arc<FakeGenerator>,
    pub segmenter: Arc<FakeSegmenter>,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self {
            behaviour: [LoadBehaviour::Succeed; 3],
            delay: Duration::ZERO,
            attempts: Default::default(),
            generator: Arc::new(FakeGenerator::default()),
            segmenter: Arc::new(FakeSegmenter::default()),
        }
    }
}

fn index(capability: Capability) -> usize {
    match capability {
        Capability::TextToImage => 0,
        Capability::Segmentation => 1,
        Capability::Classification => 2,
    }
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(mut self, capability: Capability, behaviour: LoadBehaviour) -> Self {
        self.behaviour[index(capability)] = behaviour;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_generator(mut self, generator: FakeGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_segmenter(mut self, segmenter: FakeSegmenter) -> Self {
        self.segmenter = Arc::new(segmenter);
        self
    }

    /// Number of load attempts made for a capability
    pub fn attempts(&self, capability: Capability) -> usize {
        self.attempts[index(capability)].load(Ordering::SeqCst)
    }

    async fn attempt(&self, capability: Capability) -> anyhow::Result<()> {
        self.attempts[index(capability)].fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.behaviour[index(capability)] {
            LoadBehaviour::Succeed => Ok(()),
            LoadBehaviour::Fail => anyhow::bail!("weights for {} not found", capability),
            LoadBehaviour::Panic => panic!("loader for {} crashed", capability),
        }
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load_text2img(&self) -> anyhow::Result<Arc<dyn TextToImage>> {
        self.attempt(Capability::TextToImage).await?;
        Ok(self.generator.clone())
    }

    async fn load_segmentation(&self) -> anyhow::Result<Arc<dyn Segmenter>> {
        self.attempt(Capability::Segmentation).await?;
        Ok(self.segmenter.clone())
    }

    async fn load_classification(&self) -> anyhow::Result<Arc<dyn Classifier>> {
        self.attempt(Capability::Classification).await?;
        Ok(Arc::new(FakeClassifier))
    }
}

/// Router over a fresh registry backed by `loader`
pub fn test_app(loader: Arc<FakeLoader>) -> (Router, Arc<AppState>) {
    test_app_with(loader, Settings::default())
}

pub fn test_app_with(loader: Arc<FakeLoader>, settings: Settings) -> (Router, Arc<AppState>) {
    let registry = Arc::new(ModelRegistry::new(loader));
    let state = Arc::new(AppState::new(settings, registry));
    (api::create_router(state.clone()), state)
}

/// PNG data URL of a solid-colour image
pub fn solid_image(width: u32, height: u32, colour: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(width, height, Rgb(colour));
    codec::encode_image(&image).unwrap()
}
