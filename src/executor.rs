use std::future::Future;
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle as TaskHandle;

/// Dedicated background thread driving a single-threaded tokio runtime.
///
/// Every serial completion runs here. Work can be submitted from any
/// thread through [`IoExecutor::spawn`]. Shutdown stops the loop, drops the
/// runtime (cancelling whatever is still pending) and joins the thread.
pub struct IoExecutor {
    handle: Handle,
    stop_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl IoExecutor {
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("io-executor".into())
            .spawn(move || {
                log::debug!("I/O executor running");
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                drop(runtime);
                log::debug!("I/O executor stopped");
            })?;

        Ok(Self {
            handle,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn spawn<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the event loop and join the worker. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("I/O executor thread panicked");
            }
        }
    }
}

impl Drop for IoExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
