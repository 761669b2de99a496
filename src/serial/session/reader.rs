//! Serial session actor.
//!
//! The session task runs on the I/O executor and is the only owner of the
//! open port and its line buffer. Callers talk to it through
//! [`SessionHandle`], which only holds channel endpoints.
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::types::*;
use crate::config::SessionConfig;
use crate::executor::IoExecutor;
use crate::serial::{LineDecoder, PortSettings, Result, SerialBackend, SerialError, SerialIo};

#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    metrics_rx: watch::Receiver<SessionMetrics>,
}

impl SessionHandle {
    pub async fn start(&self, port: &str) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Start { port: port.to_string(), responder: tx })
            .await
            .map_err(|_| closed_channel())?;
        rx.await.map_err(|_| dropped_reply())?
    }

    pub async fn stop(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Stop { responder: tx })
            .await
            .map_err(|_| closed_channel())?;
        rx.await.map_err(|_| dropped_reply())?
    }

    /// Synchronous `start` for callers outside any tokio runtime.
    ///
    /// # Panics
    /// Panics when called from within an async execution context.
    pub fn blocking_start(&self, port: &str) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .blocking_send(SessionCommand::Start { port: port.to_string(), responder: tx })
            .map_err(|_| closed_channel())?;
        rx.blocking_recv().map_err(|_| dropped_reply())?
    }

    /// Synchronous `stop`; same restrictions as [`SessionHandle::blocking_start`]
    pub fn blocking_stop(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .blocking_send(SessionCommand::Stop { responder: tx })
            .map_err(|_| closed_channel())?;
        rx.blocking_recv().map_err(|_| dropped_reply())?
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn snapshot_receiver(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics_rx.borrow().clone()
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<SessionMetrics> {
        self.metrics_rx.clone()
    }

    /// Ask the session task to release the port and exit. Does not wait.
    pub fn shutdown(&self) {
        if self.cmd_tx.try_send(SessionCommand::Shutdown).is_err() {
            log::debug!("Session task already gone or busy; executor shutdown will cancel it");
        }
    }
}

fn closed_channel() -> SerialError {
    SerialError::SessionUnavailable("command channel closed".into())
}

fn dropped_reply() -> SerialError {
    SerialError::SessionUnavailable("session task dropped the reply".into())
}

pub struct SessionBuilder {
    backend: Arc<dyn SerialBackend>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(backend: Arc<dyn SerialBackend>) -> Self {
        Self { backend, config: SessionConfig::default() }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the session task on `executor`.
    ///
    /// The returned receiver is the single, ordered telemetry stream.
    pub fn spawn(self, executor: &IoExecutor) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (metrics_tx, metrics_rx) = watch::channel(SessionMetrics::default());

        let actor = SessionActor {
            backend: self.backend,
            config: self.config,
            cmd_rx,
            events_tx,
            snapshot_tx,
            metrics_tx,
            metrics: SessionMetrics::default(),
        };
        executor.spawn(actor.run());

        (SessionHandle { cmd_tx, snapshot_rx, metrics_rx }, events_rx)
    }
}

/// Resources held only while Open
struct OpenPort {
    id: Uuid,
    name: String,
    io: Box<dyn SerialIo>,
    decoder: LineDecoder,
}

enum Step {
    Command(Option<SessionCommand>),
    Read(std::io::Result<usize>),
}

enum Exit {
    /// Back to Closed, keep serving commands
    Closed,
    /// Leave the task
    Shutdown,
}

struct SessionActor {
    backend: Arc<dyn SerialBackend>,
    config: SessionConfig,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    metrics_tx: watch::Sender<SessionMetrics>,
    metrics: SessionMetrics,
}

impl SessionActor {
    async fn run(mut self) {
        log::debug!("Serial session task started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                SessionCommand::Start { port, responder } => {
                    let Some(open) = self.open(&port, responder).await else { continue };
                    if let Exit::Shutdown = self.pump(open).await {
                        break;
                    }
                }
                SessionCommand::Stop { responder } => {
                    log::debug!("Stop requested while closed; nothing to do");
                    let _ = responder.send(Ok(false));
                }
                SessionCommand::Shutdown => break,
            }
        }

        log::debug!("Serial session task exiting");
    }

    async fn open(
        &mut self,
        port: &str,
        responder: oneshot::Sender<Result<SessionSnapshot>>,
    ) -> Option<OpenPort> {
        let settings = PortSettings::from(&self.config);
        let io = match self.backend.open(port, &settings).await {
            Ok(io) => io,
            Err(e) => {
                let e = match e {
                    e @ SerialError::PortOpen { .. } => e,
                    other => SerialError::PortOpen { port: port.to_string(), reason: other.to_string() },
                };
                log::warn!("{}", e);
                let _ = responder.send(Err(e));
                return None;
            }
        };

        let open = OpenPort {
            id: Uuid::new_v4(),
            name: port.to_string(),
            io,
            decoder: LineDecoder::new(self.config.max_line_len),
        };

        let snapshot = SessionSnapshot {
            state: ConnectionState::Open,
            port: Some(open.name.clone()),
            session_id: Some(open.id),
            opened_at: Some(Utc::now()),
            last_close: self.snapshot_tx.borrow().last_close.clone(),
        };
        self.snapshot_tx.send_replace(snapshot.clone());
        self.metrics.sessions_opened += 1;
        self.metrics_tx.send_replace(self.metrics.clone());
        let _ = self.events_tx.send(SessionEvent::Opened { session_id: open.id, port: open.name.clone() });

        log::info!("Serial session {} open on {}", open.id, open.name);
        let _ = responder.send(Ok(snapshot));
        Some(open)
    }

    /// Steady state: one read in flight at a time, commands checked first.
    async fn pump(&mut self, mut open: OpenPort) -> Exit {
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];

        loop {
            let step = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                res = open.io.read(&mut buf) => Step::Read(res),
            };

            match step {
                Step::Command(Some(SessionCommand::Start { responder, .. })) => {
                    log::warn!("Start rejected: session already open on {}", open.name);
                    let _ = responder.send(Err(SerialError::AlreadyOpen(open.name.clone())));
                }
                Step::Command(Some(SessionCommand::Stop { responder })) => {
                    self.close(open, CloseReason::Stopped).await;
                    let _ = responder.send(Ok(true));
                    return Exit::Closed;
                }
                Step::Command(Some(SessionCommand::Shutdown)) | Step::Command(None) => {
                    self.close(open, CloseReason::Shutdown).await;
                    return Exit::Shutdown;
                }
                Step::Read(Ok(0)) => {
                    self.close(open, CloseReason::IoError("port closed by device".into())).await;
                    return Exit::Closed;
                }
                Step::Read(Ok(n)) => self.dispatch(&mut open, &buf[..n]),
                Step::Read(Err(e)) => {
                    self.close(open, CloseReason::IoError(e.to_string())).await;
                    return Exit::Closed;
                }
            }
        }
    }

    fn dispatch(&mut self, open: &mut OpenPort, bytes: &[u8]) {
        self.metrics.bytes_read += bytes.len() as u64;
        let decoded = open.decoder.feed(bytes);
        self.metrics.oversized_lines += decoded.overflowed;

        for raw in decoded.lines {
            let text = match String::from_utf8(raw) {
                Ok(text) => text,
                Err(e) => {
                    self.metrics.utf8_decode_errors += 1;
                    log::debug!("Non UTF-8 telemetry line: {}", hex::encode(e.as_bytes()));
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            log::debug!("[{}] {}", open.name, text);
            self.metrics.lines_read += 1;
            let line = TelemetryLine { session_id: open.id, text, received_at: Utc::now() };
            let _ = self.events_tx.send(SessionEvent::Line(line));
        }

        self.metrics_tx.send_replace(self.metrics.clone());
    }

    async fn close(&mut self, open: OpenPort, reason: CloseReason) {
        let OpenPort { id, name, io, decoder } = open;
        // The pending read was dropped with the select; this releases the handle
        drop(io);
        if decoder.pending() > 0 {
            log::debug!("Dropping {} bytes of unterminated line from {}", decoder.pending(), name);
        }

        match &reason {
            CloseReason::Stopped => log::info!("Serial session {} on {} stopped", id, name),
            CloseReason::IoError(msg) => {
                log::error!("Serial session {} on {} failed: {}", id, name, msg);
                self.metrics.last_error = Some(msg.clone());
                self.metrics_tx.send_replace(self.metrics.clone());
            }
            CloseReason::Shutdown => log::info!("Serial session {} on {} closed for shutdown", id, name),
        }

        let grace = reason != CloseReason::Shutdown;
        self.snapshot_tx.send_replace(SessionSnapshot::closed(Some(reason.clone())));
        let _ = self.events_tx.send(SessionEvent::Closed { session_id: id, port: name, reason });

        // No reply or new command until the OS has let go of the port
        if grace {
            tokio::time::sleep(self.config.close_grace()).await;
        }
    }
}
