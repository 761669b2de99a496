use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{AudioBackend, AudioDeviceDescriptor, AudioError, Result};

struct Endpoint {
    descriptor: AudioDeviceDescriptor,
    level: f32,
}

/// In-process mixer used for tests and headless runs.
#[derive(Default)]
pub struct MemoryBackend {
    endpoints: Mutex<Vec<Endpoint>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints<'a>(endpoints: impl IntoIterator<Item = (&'a str, &'a str, f32)>) -> Self {
        let backend = Self::new();
        for (id, name, level) in endpoints {
            backend.add_endpoint(id, name, level);
        }
        backend
    }

    pub fn add_endpoint(&self, id: &str, display_name: &str, level: f32) {
        self.lock().push(Endpoint {
            descriptor: AudioDeviceDescriptor {
                id: id.to_string(),
                display_name: display_name.to_string(),
            },
            level: level.clamp(0.0, 1.0),
        });
    }

    /// Simulate an endpoint being unplugged or disabled
    pub fn remove_endpoint(&self, id: &str) -> bool {
        let mut endpoints = self.lock();
        let before = endpoints.len();
        endpoints.retain(|e| e.descriptor.id != id);
        endpoints.len() != before
    }

    /// Make every enumeration fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn level(&self, id: &str) -> Option<f32> {
        self.lock().iter().find(|e| e.descriptor.id == id).map(|e| e.level)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AudioError::Enumeration("simulated mixer failure".into()))
        } else {
            Ok(())
        }
    }
}

impl AudioBackend for MemoryBackend {
    fn render_endpoints(&self) -> Result<Vec<AudioDeviceDescriptor>> {
        self.check_available()?;
        Ok(self.lock().iter().map(|e| e.descriptor.clone()).collect())
    }

    fn volume(&self, endpoint_id: &str) -> Result<f32> {
        self.check_available()?;
        self.level(endpoint_id)
            .ok_or_else(|| AudioError::DeviceNotFound(endpoint_id.to_string()))
    }

    fn set_volume(&self, endpoint_id: &str, level: f32) -> Result<()> {
        self.check_available()?;
        let mut endpoints = self.lock();
        let endpoint = endpoints
            .iter_mut()
            .find(|e| e.descriptor.id == endpoint_id)
            .ok_or_else(|| AudioError::DeviceNotFound(endpoint_id.to_string()))?;
        endpoint.level = level;
        Ok(())
    }
}
