#![allow(dead_code)]
// Scripted serial backend: each opened port is fed from the test through an
// unbounded channel instead of a real device.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use volume_bridge_lib::serial::{PortSettings, Result, SerialBackend, SerialError, SerialIo};
use volume_bridge_lib::{BridgeConfig, SessionConfig, SessionEvent};

type Feed = mpsc::UnboundedSender<io::Result<Vec<u8>>>;

#[derive(Default)]
struct State {
    available: Vec<String>,
    open: HashMap<String, Feed>,
    opened_total: usize,
    last_settings: Option<PortSettings>,
}

#[derive(Clone, Default)]
pub struct ScriptedSerial {
    state: Arc<Mutex<State>>,
}

impl ScriptedSerial {
    pub fn with_ports(ports: &[&str]) -> Self {
        let serial = Self::default();
        serial.state.lock().unwrap().available = ports.iter().map(|p| p.to_string()).collect();
        serial
    }

    pub fn feed(&self, port: &str, bytes: &[u8]) {
        let state = self.state.lock().unwrap();
        let tx = state.open.get(port).expect("port not open");
        tx.send(Ok(bytes.to_vec())).expect("reader gone");
    }

    pub fn fail(&self, port: &str, kind: io::ErrorKind) {
        let state = self.state.lock().unwrap();
        let tx = state.open.get(port).expect("port not open");
        tx.send(Err(io::Error::new(kind, "simulated read failure"))).expect("reader gone");
    }

    /// Queue several reads at once so they land before the port can close
    pub fn script(&self, port: &str, reads: Vec<io::Result<Vec<u8>>>) {
        let state = self.state.lock().unwrap();
        let tx = state.open.get(port).expect("port not open");
        for read in reads {
            tx.send(read).expect("reader gone");
        }
    }

    /// Device side goes away; the reader sees end of stream
    pub fn hang_up(&self, port: &str) {
        let mut state = self.state.lock().unwrap();
        state.open.remove(port);
    }

    pub fn is_open(&self, port: &str) -> bool {
        self.state.lock().unwrap().open.contains_key(port)
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn opened_total(&self) -> usize {
        self.state.lock().unwrap().opened_total
    }

    pub fn last_settings(&self) -> Option<PortSettings> {
        self.state.lock().unwrap().last_settings
    }
}

#[async_trait]
impl SerialBackend for ScriptedSerial {
    fn available_ports(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().available.clone())
    }

    async fn open(&self, port_name: &str, settings: &PortSettings) -> Result<Box<dyn SerialIo>> {
        let mut state = self.state.lock().unwrap();
        if !state.available.iter().any(|p| p == port_name) {
            return Err(SerialError::PortOpen {
                port: port_name.to_string(),
                reason: "The system cannot find the file specified.".into(),
            });
        }
        if state.open.contains_key(port_name) {
            return Err(SerialError::PortOpen {
                port: port_name.to_string(),
                reason: "Access is denied.".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.open.insert(port_name.to_string(), tx);
        state.opened_total += 1;
        state.last_settings = Some(*settings);

        Ok(Box::new(ScriptedPort {
            name: port_name.to_string(),
            rx,
            pending: Vec::new(),
            state: self.state.clone(),
        }))
    }
}

struct ScriptedPort {
    name: String,
    rx: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    state: Arc<Mutex<State>>,
}

impl AsyncRead for ScriptedPort {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.drain(..n);
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.pending = bytes,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ScriptedPort {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open.remove(&self.name);
        }
    }
}

pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        session: SessionConfig { close_grace_ms: 10, ..SessionConfig::default() },
    }
}

/// Wait for the next event without a runtime
pub fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match events.try_recv() {
            Ok(event) => return event,
            Err(mpsc::error::TryRecvError::Empty) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => panic!("no session event: {:?}", e),
        }
    }
}

pub fn expect_line(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> String {
    match next_event(events) {
        SessionEvent::Line(line) => line.text,
        other => panic!("expected a telemetry line, got {:?}", other),
    }
}

pub fn assert_quiet(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    std::thread::sleep(Duration::from_millis(50));
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event {:?}", event);
    }
}
