pub mod audio;
pub mod bridge;
pub mod config;
pub mod executor;
pub mod serial;

pub use audio::{AudioBackend, AudioDeviceDescriptor, AudioError};
pub use bridge::{Bridge, BridgeError, BridgeSnapshot};
pub use config::{BridgeConfig, SessionConfig};
pub use executor::IoExecutor;
pub use serial::session::{CloseReason, ConnectionState, SessionEvent, SessionMetrics, SessionSnapshot, TelemetryLine};
pub use serial::{SerialBackend, SerialError};
