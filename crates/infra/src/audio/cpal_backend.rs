//! CPAL-based device enumeration
//!
//! Provides a cross-platform listing of playback devices using the CPAL library.

use cpal::traits::{DeviceTrait, HostTrait};
use eqtrain_core::domain::audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, Result, SampleRate,
};
use tracing::{debug, info, warn};

/// Human-readable device name, used as the device ID
#[allow(deprecated)]
pub(crate) fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Find an output device by ID, or the host default when `id` is `None`
pub(crate) fn find_output_device(host: &cpal::Host, id: Option<&DeviceId>) -> Result<cpal::Device> {
    match id {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(id) => host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?
            .find(|d| device_name(d) == id.as_str())
            .ok_or_else(|| AudioError::DeviceNotFound(id.as_str().to_string())),
    }
}

fn output_info(device: &cpal::Device) -> DeviceInfo {
    let name = device_name(device);
    let default_sample_rate = device
        .default_output_config()
        .ok()
        .map(|config| SampleRate::from_hz(config.sample_rate()));

    DeviceInfo {
        id: DeviceId::new(name.clone()),
        name,
        default_sample_rate,
    }
}

/// CPAL-based audio enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        info!("Enumerating output devices");

        let cpal_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            if device.supported_output_configs().is_err() {
                warn!(name = %device_name(&device), "Skipping device without output configs");
                continue;
            }
            let info = output_info(&device);
            debug!("Found device: {}", info.name);
            devices.push(info);
        }

        info!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        let device = find_output_device(&self.host, None)?;
        Ok(output_info(&device))
    }
}
