pub mod decoder;
pub mod interface;
pub mod session;

pub use decoder::LineDecoder;
pub use interface::{list_ports, try_list_ports, PortSettings, SerialBackend, SerialIo, SystemSerial};
pub use session::{SessionBuilder, SessionHandle};

/// Name of a serial port as reported by the OS (`COM3`, `/dev/ttyACM0`, ...)
pub type SerialPortDescriptor = String;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Failed to open {port}: {reason}")]
    PortOpen { port: String, reason: String },

    #[error("Session already open on {0}")]
    AlreadyOpen(String),

    #[error("Port I/O error: {0}")]
    PortIo(String),

    #[error("Serial session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Port enumeration failed: {0}")]
    Enumeration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
