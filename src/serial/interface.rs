use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

use super::{Result, SerialError, SerialPortDescriptor};
use crate::config::{SessionConfig, DEFAULT_BAUD_RATE};

/// Line settings applied when a port is opened.
///
/// Framing is fixed at 8 data bits, no parity, one stop bit and no flow
/// control; only the baud rate varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    pub baud_rate: u32,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self { baud_rate: DEFAULT_BAUD_RATE }
    }
}

impl From<&SessionConfig> for PortSettings {
    fn from(config: &SessionConfig) -> Self {
        Self { baud_rate: config.baud_rate }
    }
}

/// Byte source owned by an open session.
pub trait SerialIo: AsyncRead + Send + Unpin {}

impl<T: AsyncRead + Send + Unpin + ?Sized> SerialIo for T {}

/// OS-facing side of the serial link: port listing and port acquisition.
///
/// `open` is always awaited on the I/O executor thread, so implementations
/// may register the handle with the tokio reactor.
#[async_trait]
pub trait SerialBackend: Send + Sync {
    fn available_ports(&self) -> Result<Vec<SerialPortDescriptor>>;

    async fn open(&self, port_name: &str, settings: &PortSettings) -> Result<Box<dyn SerialIo>>;
}

/// Real serial ports through `serialport` / `tokio-serial`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

#[async_trait]
impl SerialBackend for SystemSerial {
    fn available_ports(&self) -> Result<Vec<SerialPortDescriptor>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|port| port.port_name).collect())
    }

    async fn open(&self, port_name: &str, settings: &PortSettings) -> Result<Box<dyn SerialIo>> {
        let stream = tokio_serial::new(port_name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| SerialError::PortOpen {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        log::info!("Opened serial port {} at {} baud", port_name, settings.baud_rate);
        Ok(Box::new(stream))
    }
}

/// List port names, degrading to an empty list when the OS query fails
pub fn list_ports(backend: &dyn SerialBackend) -> Vec<SerialPortDescriptor> {
    match try_list_ports(backend) {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    }
}

pub fn try_list_ports(backend: &dyn SerialBackend) -> Result<Vec<SerialPortDescriptor>> {
    let ports = backend
        .available_ports()
        .map_err(|e| SerialError::Enumeration(e.to_string()))?;
    log::debug!("Found {} serial port(s)", ports.len());
    Ok(ports)
}
