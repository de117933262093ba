//! Main-thread marshalling
//!
//! Both host applications only allow scene and asset calls from their own
//! privileged thread. Socket workers hold a [`MainThread`] handle and post
//! closures to it; the host's per-tick callback owns the matching
//! [`MainThreadPump`] and runs whatever is pending with `&mut` access to the
//! host.

use dcc_link_core::{LinkError, Result};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job<H> = Box<dyn FnOnce(&mut H) + Send>;

/// Create a connected handle/pump pair
pub fn main_thread_channel<H>() -> (MainThread<H>, MainThreadPump<H>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainThread { tx }, MainThreadPump { rx })
}

/// Cloneable handle used off the main thread to reach the host
pub struct MainThread<H> {
    tx: mpsc::UnboundedSender<Job<H>>,
}

impl<H> Clone for MainThread<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<H> fmt::Debug for MainThread<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThread")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<H: 'static> MainThread<H> {
    /// Run `f` on the main thread and wait for its result
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.enqueue(f)?;
        rx.await.map_err(|_| LinkError::MainThreadUnavailable)
    }

    /// Blocking variant of [`call`](Self::call) for plain OS threads.
    ///
    /// For threads a host plugin starts outside the runtime, such as a
    /// file watcher or a synchronous callback the host fires off its main
    /// thread, that need a scene query without an executor.
    ///
    /// Must not be used from inside an async task or from the main thread
    /// itself; both would deadlock.
    pub fn call_blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        let rx = self.enqueue(f)?;
        rx.blocking_recv().map_err(|_| LinkError::MainThreadUnavailable)
    }

    /// Queue `f` for the next tick without waiting
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut H) + Send + 'static,
    {
        self.tx
            .send(Box::new(f))
            .map_err(|_| LinkError::MainThreadUnavailable)
    }

    /// Whether the pump has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn enqueue<R, F>(&self, f: F) -> Result<oneshot::Receiver<R>>
    where
        F: FnOnce(&mut H) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.post(move |host| {
            // Caller may have given up waiting
            let _ = result_tx.send(f(host));
        })?;
        Ok(result_rx)
    }
}

/// Receiving side, owned by the host's privileged thread
pub struct MainThreadPump<H> {
    rx: mpsc::UnboundedReceiver<Job<H>>,
}

impl<H> MainThreadPump<H> {
    /// Run every queued job in order. Returns how many ran.
    ///
    /// A panicking job is logged and skipped; its caller sees
    /// [`LinkError::MainThreadUnavailable`].
    pub fn run_pending(&mut self, host: &mut H) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            ran += 1;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| job(host))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!("Main thread job panicked: {}", reason);
            }
        }
        if ran > 0 {
            debug!("Ran {} main thread job(s)", ran);
        }
        ran
    }
}
