use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::{self, AudioBackend, AudioDeviceDescriptor, AudioError, VolumeController};
use crate::config::BridgeConfig;
use crate::executor::IoExecutor;
use crate::serial::session::{SessionEvent, SessionMetrics, SessionSnapshot};
use crate::serial::{self, SerialBackend, SerialError, SerialPortDescriptor, SessionBuilder, SessionHandle, SystemSerial};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Failed to start I/O executor: {0}")]
    Executor(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Everything a display layer needs to draw one frame
#[derive(Debug, Clone, Serialize)]
pub struct BridgeSnapshot {
    pub ports: Vec<SerialPortDescriptor>,
    pub devices: Vec<AudioDeviceDescriptor>,
    pub session: SessionSnapshot,
}

/// Command surface of the bridge.
///
/// Owns the I/O executor, the serial session running on it, the port and
/// device snapshots, and the volume controller. Methods are synchronous and
/// meant to be called from a UI or CLI thread; serial work is handed to the
/// executor and awaited there. Async callers should go through
/// [`Bridge::session_handle`] instead of `start`/`stop`.
pub struct Bridge {
    serial: Arc<dyn SerialBackend>,
    ports: Vec<SerialPortDescriptor>,
    volume: VolumeController,
    session: SessionHandle,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    executor: IoExecutor,
}

impl Bridge {
    /// Bridge over the host's serial ports and audio endpoints
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Self::with_backends(config, Arc::new(SystemSerial), audio::default_backend())
    }

    pub fn with_backends(
        config: BridgeConfig,
        serial: Arc<dyn SerialBackend>,
        audio: Arc<dyn AudioBackend>,
    ) -> Result<Self> {
        let executor = IoExecutor::new()?;
        let (session, events) = SessionBuilder::new(serial.clone())
            .config(config.session)
            .spawn(&executor);

        let ports = serial::list_ports(serial.as_ref());
        let volume = VolumeController::new(audio);
        log::info!(
            "Bridge ready: {} serial port(s), {} audio device(s)",
            ports.len(),
            volume.devices().len()
        );

        Ok(Self {
            serial,
            ports,
            volume,
            session,
            events: Some(events),
            executor,
        })
    }

    pub fn list_ports(&self) -> &[SerialPortDescriptor] {
        &self.ports
    }

    pub fn refresh_ports(&mut self) -> &[SerialPortDescriptor] {
        self.ports = serial::list_ports(self.serial.as_ref());
        &self.ports
    }

    pub fn list_devices(&self) -> &[AudioDeviceDescriptor] {
        self.volume.devices()
    }

    /// Re-enumerate audio endpoints; previously used indices must be re-resolved
    pub fn refresh_devices(&mut self) -> &[AudioDeviceDescriptor] {
        self.volume.refresh()
    }

    pub fn get_volume(&self, index: usize) -> std::result::Result<f32, AudioError> {
        self.volume.get_volume(index)
    }

    /// Volume for display: a device that has gone away reads as 0.0.
    ///
    /// Bad indices and enumeration failures are still errors.
    pub fn display_volume(&self, index: usize) -> std::result::Result<f32, AudioError> {
        match self.volume.get_volume(index) {
            Err(AudioError::DeviceNotFound(name)) => {
                log::warn!("Device '{}' not found; showing volume 0", name);
                Ok(0.0)
            }
            other => other,
        }
    }

    pub fn set_volume(&self, index: usize, level: f32) -> std::result::Result<f32, AudioError> {
        self.volume.set_volume(index, level)
    }

    /// Open `port` and begin streaming telemetry.
    ///
    /// # Panics
    /// Panics when called from inside a tokio runtime.
    pub fn start(&self, port: &str) -> std::result::Result<SessionSnapshot, SerialError> {
        self.session.blocking_start(port)
    }

    /// Close the session if open. Returns whether anything was closed.
    pub fn stop(&self) -> std::result::Result<bool, SerialError> {
        self.session.blocking_stop()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.session.metrics()
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Take the telemetry stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            ports: self.ports.clone(),
            devices: self.volume.devices().to_vec(),
            session: self.session.snapshot(),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.session.shutdown();
        self.executor.shutdown();
        log::debug!("Bridge shut down");
    }
}
