use serde::{Deserialize, Serialize};
use std::time::Duration;

// Wire parameters of the controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;
// Windows needs a moment after CloseHandle before the same COM port can be reopened
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 100;
pub const DEFAULT_COMMAND_CAPACITY: usize = 16;

/// Tunables for the serial session actor.
///
/// Only the baud rate is exposed on the wire side; framing is fixed at 8N1
/// with no flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub baud_rate: u32,
    /// Size of the scratch buffer handed to each read
    pub read_chunk_size: usize,
    /// Partial lines longer than this are discarded
    pub max_line_len: usize,
    pub close_grace_ms: u64,
    pub command_capacity: usize,
}

impl SessionConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub session: SessionConfig,
}
