//! Audio render endpoint enumeration and scalar volume control.
//!
//! OS access goes through [`AudioBackend`]. Endpoint handles are acquired
//! and released inside each backend call on the calling thread; nothing is
//! kept between calls.
pub mod memory;
pub mod volume;

#[cfg(windows)]
mod core_audio;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use memory::MemoryBackend;
pub use volume::VolumeController;

#[cfg(windows)]
pub use core_audio::CoreAudioBackend;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio endpoint enumeration failed: {0}")]
    Enumeration(String),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid device index {index} ({len} devices known)")]
    InvalidDeviceIndex { index: usize, len: usize },

    #[error("Invalid volume level: {0}")]
    InvalidLevel(f32),

    #[error("Audio endpoint error: {0}")]
    Endpoint(String),

    #[error("Audio endpoint API is not available on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// One active render endpoint as seen at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceDescriptor {
    /// OS endpoint id, stable across reboots for the same hardware
    pub id: String,
    pub display_name: String,
}

pub trait AudioBackend: Send + Sync {
    /// Active render endpoints in OS order.
    ///
    /// Endpoints that fail individually are skipped; `Err` means the whole
    /// query failed.
    fn render_endpoints(&self) -> Result<Vec<AudioDeviceDescriptor>>;

    /// Scalar master volume of the live endpoint `endpoint_id`
    fn volume(&self, endpoint_id: &str) -> Result<f32>;

    fn set_volume(&self, endpoint_id: &str, level: f32) -> Result<()>;
}

/// List render endpoints, degrading to an empty list on failure
pub fn list_render_devices(backend: &dyn AudioBackend) -> Vec<AudioDeviceDescriptor> {
    match try_list_render_devices(backend) {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("{}", e);
            Vec::new()
        }
    }
}

pub fn try_list_render_devices(backend: &dyn AudioBackend) -> Result<Vec<AudioDeviceDescriptor>> {
    let devices = backend.render_endpoints()?;
    log::debug!("Found {} active render endpoint(s)", devices.len());
    Ok(devices)
}

/// Backend for the host platform
pub fn default_backend() -> Arc<dyn AudioBackend> {
    #[cfg(windows)]
    {
        Arc::new(CoreAudioBackend::new())
    }

    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedBackend::new())
    }
}

/// Stand-in for platforms without an endpoint volume API
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new() -> Self {
        log::warn!("Audio endpoint control not supported on this platform");
        Self
    }
}

impl AudioBackend for UnsupportedBackend {
    fn render_endpoints(&self) -> Result<Vec<AudioDeviceDescriptor>> {
        Err(AudioError::Unsupported)
    }

    fn volume(&self, _endpoint_id: &str) -> Result<f32> {
        Err(AudioError::Unsupported)
    }

    fn set_volume(&self, _endpoint_id: &str, _level: f32) -> Result<()> {
        Err(AudioError::Unsupported)
    }
}
