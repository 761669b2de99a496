use std::sync::Arc;

use super::{list_render_devices, AudioBackend, AudioDeviceDescriptor, AudioError, Result};

/// Gets and sets endpoint volume by index into an enumeration snapshot.
///
/// Levels are never cached: every call re-enumerates the live endpoints,
/// re-validates the stored id and talks to the OS mixer directly.
pub struct VolumeController {
    backend: Arc<dyn AudioBackend>,
    snapshot: Vec<AudioDeviceDescriptor>,
}

impl VolumeController {
    /// Take the initial device snapshot from `backend`
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        let snapshot = list_render_devices(backend.as_ref());
        Self { backend, snapshot }
    }

    pub fn devices(&self) -> &[AudioDeviceDescriptor] {
        &self.snapshot
    }

    /// Replace the snapshot. Indices handed out before now refer to the new list.
    pub fn refresh(&mut self) -> &[AudioDeviceDescriptor] {
        self.snapshot = list_render_devices(self.backend.as_ref());
        log::info!("Audio device list refreshed ({} devices)", self.snapshot.len());
        &self.snapshot
    }

    /// Current scalar volume in `[0.0, 1.0]`
    pub fn get_volume(&self, index: usize) -> Result<f32> {
        let endpoint_id = self.resolve(index)?;
        let level = self.backend.volume(&endpoint_id)?;
        Ok(level.clamp(0.0, 1.0))
    }

    /// Clamp `level` into `[0.0, 1.0]` and push it; returns the value written
    pub fn set_volume(&self, index: usize, level: f32) -> Result<f32> {
        if level.is_nan() {
            return Err(AudioError::InvalidLevel(level));
        }
        let level = level.clamp(0.0, 1.0);
        let endpoint_id = self.resolve(index)?;
        self.backend.set_volume(&endpoint_id, level)?;
        log::debug!("Set volume of {} to {:.3}", endpoint_id, level);
        Ok(level)
    }

    /// Map a snapshot index to a live endpoint id.
    ///
    /// The stored id wins. If it is gone, a display-name match is accepted
    /// only when exactly one live endpoint carries that name.
    fn resolve(&self, index: usize) -> Result<String> {
        let wanted = self.snapshot.get(index).ok_or(AudioError::InvalidDeviceIndex {
            index,
            len: self.snapshot.len(),
        })?;

        let live = self.backend.render_endpoints()?;
        if live.iter().any(|d| d.id == wanted.id) {
            return Ok(wanted.id.clone());
        }

        let mut by_name = live.iter().filter(|d| d.display_name == wanted.display_name);
        match (by_name.next(), by_name.next()) {
            (Some(found), None) => {
                log::debug!("Endpoint id for '{}' changed; matched by name", wanted.display_name);
                Ok(found.id.clone())
            }
            (Some(_), Some(_)) => {
                log::warn!("Device '{}' is ambiguous: several endpoints share the name", wanted.display_name);
                Err(AudioError::DeviceNotFound(wanted.display_name.clone()))
            }
            (None, _) => {
                log::warn!("Device '{}' is no longer active", wanted.display_name);
                Err(AudioError::DeviceNotFound(wanted.display_name.clone()))
            }
        }
    }
}
