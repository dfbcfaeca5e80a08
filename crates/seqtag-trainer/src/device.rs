//! Compute device selection.

use candle_core::Device;
use tracing::{info, warn};

/// The CUDA device `gpu_id`, or the CPU when it cannot be opened or
/// `force_cpu` is set.
pub fn select_device(gpu_id: usize, force_cpu: bool) -> Device {
    if force_cpu {
        info!("Running on CPU");
        return Device::Cpu;
    }

    match Device::new_cuda(gpu_id) {
        Ok(device) => {
            info!(gpu_id, "Running with GPU");
            device
        }
        Err(e) => {
            warn!(gpu_id, error = %e, "GPU is not available, falling back to CPU");
            Device::Cpu
        }
    }
}
