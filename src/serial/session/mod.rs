pub mod reader;
pub mod types;

pub use reader::{SessionBuilder, SessionHandle};
pub use types::{
    CloseReason, ConnectionState, SessionCommand, SessionEvent, SessionMetrics, SessionSnapshot,
    TelemetryLine,
};
