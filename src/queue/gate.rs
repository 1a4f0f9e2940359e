//! Inference gate sizing heavy work to the device

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::backend::traits::Capability;
use crate::error::{panic_message, AppError, Result};

#[derive(Default)]
struct Counters {
    in_flight: AtomicU64,
    completed: AtomicU64,
}

/// Decrements the in-flight count when the blocking job ends, even by panic
struct InFlightGuard(Arc<Counters>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.0.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounds how many inferences run on the device at once.
///
/// Jobs run on the blocking pool. The permit travels with the job, so a caller
/// that disconnects does not free a slot while its inference is still running.
pub struct InferenceGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    counters: Arc<Counters>,
}

impl InferenceGate {
    /// Create a gate allowing `max_concurrent` simultaneous jobs
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Run a blocking inference job once a permit is free.
    ///
    /// Errors and panics raised by the job come back as `AppError::Inference`.
    pub async fn run<T, F>(&self, capability: Capability, job: F) -> Result<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("Inference gate is closed".to_string()))?;

        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        let guard = InFlightGuard(self.counters.clone());
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = guard;
            job()
        })
        .await;

        debug!(
            capability = %capability,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Inference finished"
        );

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::Inference(format!("{:#}", e))),
            Err(e) if e.is_panic() => {
                let message = panic_message(&*e.into_panic());
                error!(capability = %capability, error = %message, "Inference panicked");
                Err(AppError::Inference(format!(
                    "{} inference panicked: {}",
                    capability, message
                )))
            }
            Err(e) => Err(AppError::Inference(format!(
                "{} inference was cancelled: {}",
                capability, e
            ))),
        }
    }

    /// Snapshot of the gate counters
    pub fn stats(&self) -> GateStats {
        GateStats {
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Gate statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GateStats {
    pub in_flight: u64,
    pub completed: u64,
    pub max_concurrent: usize,
}
