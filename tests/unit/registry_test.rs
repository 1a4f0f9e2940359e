//! Unit tests for the model registry

#[path = "../common/fakes.rs"]
mod fakes;

use canvas_ai_service::backend::{
    traits::{Capability, CapabilityState},
    ModelRegistry,
};
use canvas_ai_service::AppError;
use fakes::{FakeLoader, LoadBehaviour};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_starts_unloaded() {
    let registry = ModelRegistry::new(Arc::new(FakeLoader::new()));

    for (_, state) in registry.snapshot() {
        assert_eq!(state, CapabilityState::Unloaded);
    }
    assert!(!registry.is_available(Capability::TextToImage));
}

#[tokio::test]
async fn test_loads_on_first_access() {
    let loader = Arc::new(FakeLoader::new());
    let registry = ModelRegistry::new(loader.clone());

    assert!(registry.text2img().await.is_ok());
    assert!(registry.text2img().await.is_ok());

    assert_eq!(loader.attempts(Capability::TextToImage), 1);
    assert_eq!(registry.state(Capability::TextToImage), CapabilityState::Loaded);
    assert_eq!(registry.state(Capability::Segmentation), CapabilityState::Unloaded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_loads_once() {
    let loader = Arc::new(FakeLoader::new().with_delay(Duration::from_millis(100)));
    let registry = Arc::new(ModelRegistry::new(loader.clone()));

    let handles = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.segmentation().await.is_ok() })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(loader.attempts(Capability::Segmentation), 1);
}

#[tokio::test]
async fn test_reports_loading_while_in_progress() {
    let loader = Arc::new(FakeLoader::new().with_delay(Duration::from_millis(200)));
    let registry = Arc::new(ModelRegistry::new(loader));

    let pending = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.classification().await.is_ok() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        registry.state(Capability::Classification),
        CapabilityState::Loading
    );

    assert!(pending.await.unwrap());
    assert_eq!(
        registry.state(Capability::Classification),
        CapabilityState::Loaded
    );
}

#[tokio::test]
async fn test_failure_is_final_and_isolated() {
    let loader = Arc::new(
        FakeLoader::new().with_behaviour(Capability::Segmentation, LoadBehaviour::Fail),
    );
    let registry = ModelRegistry::new(loader.clone());

    let err = registry.segmentation().await.err().unwrap();
    assert!(matches!(err, AppError::Unavailable(_)));
    assert!(err.to_string().contains("weights for sam not found"));

    // No retry after a failure
    assert!(registry.segmentation().await.is_err());
    assert_eq!(loader.attempts(Capability::Segmentation), 1);
    assert_eq!(registry.state(Capability::Segmentation), CapabilityState::LoadFailed);

    // Other capabilities are unaffected
    assert!(registry.text2img().await.is_ok());
    assert!(registry.classification().await.is_ok());
}

#[tokio::test]
async fn test_loader_panic_is_recorded_as_failure() {
    let loader = Arc::new(
        FakeLoader::new().with_behaviour(Capability::TextToImage, LoadBehaviour::Panic),
    );
    let registry = ModelRegistry::new(loader);

    let err = registry.text2img().await.err().unwrap();
    assert!(matches!(err, AppError::Unavailable(_)));
    assert_eq!(registry.state(Capability::TextToImage), CapabilityState::LoadFailed);
}

#[tokio::test]
async fn test_preload_all_never_fails() {
    let loader = Arc::new(
        FakeLoader::new()
            .with_behaviour(Capability::TextToImage, LoadBehaviour::Fail)
            .with_behaviour(Capability::Classification, LoadBehaviour::Panic),
    );
    let registry = ModelRegistry::new(loader.clone());

    registry.preload_all().await;

    assert_eq!(registry.state(Capability::TextToImage), CapabilityState::LoadFailed);
    assert_eq!(registry.state(Capability::Segmentation), CapabilityState::Loaded);
    assert_eq!(registry.state(Capability::Classification), CapabilityState::LoadFailed);
    for capability in Capability::ALL {
        assert_eq!(loader.attempts(capability), 1);
    }
}
