//! Queue module - scheduling of blocking inference work

pub mod gate;

pub use gate::{GateStats, InferenceGate};
