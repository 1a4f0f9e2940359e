//! Device placement for model weights

use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};
use tracing::{info, warn};

use crate::config::DeviceConfig;

/// Pick the device a model is placed on: an accelerator when one is present,
/// the CPU otherwise. Called once per load.
pub fn select_device(config: &DeviceConfig) -> Result<Device> {
    if config.cpu {
        info!("Running on CPU (forced by configuration)");
        return Ok(Device::Cpu);
    }

    if cuda_is_available() {
        info!(ordinal = config.ordinal, "Running on CUDA");
        Ok(Device::new_cuda(config.ordinal)?)
    } else if metal_is_available() {
        info!(ordinal = config.ordinal, "Running on Metal");
        Ok(Device::new_metal(config.ordinal)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        warn!("Running on CPU, to run on GPU (metal) build with `--features metal`");
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        warn!("Running on CPU, to run on GPU build with `--features cuda`");
        Ok(Device::Cpu)
    }
}

/// Half precision on accelerators when allowed, full precision on the CPU
pub fn preferred_dtype(device: &Device, allow_f16: bool) -> DType {
    if allow_f16 && !device.is_cpu() {
        DType::F16
    } else {
        DType::F32
    }
}
