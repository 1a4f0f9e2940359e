//! Backend module - Capability traits, registry, and candle model loaders

pub mod clip;
pub mod device;
pub mod loader;
pub mod registry;
pub mod sam;
pub mod stable_diffusion;
pub mod traits;
mod util;

pub use loader::CandleLoader;
pub use registry::ModelRegistry;
