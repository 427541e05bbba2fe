//! Device selection with trivial defaulting.
//!
//! Picks the best available backend unless an explicit preference is given.
//! Anything beyond that (memory pools, dtype tuning) is out of scope here.

use candle_core::Device;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

impl DeviceKind {
    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceKind::Cpu)
    }
}

/// Select a device, honoring an optional `"cpu"` / `"cuda"` / `"metal"`
/// preference. With no preference: CUDA if available, then Metal, then CPU.
pub fn select_device(preference: Option<&str>) -> Result<(Device, DeviceKind)> {
    match preference {
        Some("cpu") => return Ok((Device::Cpu, DeviceKind::Cpu)),
        Some("cuda") => {
            let device = Device::new_cuda(0)?;
            return Ok((device, DeviceKind::Cuda));
        }
        Some("metal") => {
            let device = Device::new_metal(0)?;
            return Ok((device, DeviceKind::Metal));
        }
        Some(other) => {
            return Err(Error::ConfigError(format!(
                "unknown device preference: {other}"
            )));
        }
        None => {}
    }

    if candle_core::utils::cuda_is_available() {
        let device = Device::new_cuda(0)?;
        info!("selected CUDA device");
        return Ok((device, DeviceKind::Cuda));
    }
    if candle_core::utils::metal_is_available() {
        let device = Device::new_metal(0)?;
        info!("selected Metal device");
        return Ok((device, DeviceKind::Metal));
    }
    info!("selected CPU device");
    Ok((Device::Cpu, DeviceKind::Cpu))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_preference_returns_cpu() {
        let (device, kind) = select_device(Some("cpu")).unwrap();
        assert!(device.is_cpu());
        assert!(kind.is_cpu());
    }

    #[test]
    fn unknown_preference_is_config_error() {
        let err = select_device(Some("tpu")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
