//! Shutdown coordination
//!
//! A started scan normally runs to a terminal status. Process shutdown is the
//! one exception: the coordinator broadcasts a signal that rate limiter waits
//! observe, so in-flight collectors unwind with a typed cancellation instead of
//! being torn down mid-send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cloneable handle that broadcasts and observes a shutdown request
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown; idempotent
    pub fn trigger_shutdown(&self) {
        // Release pairs with the Acquire in is_shutdown_requested
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been requested
    ///
    /// Subscribes before checking the flag so a trigger racing with this call
    /// is never missed.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        // Lagged or Closed both mean "something happened"; re-check the flag
        loop {
            let _ = rx.recv().await;
            if self.is_shutdown_requested() {
                return;
            }
        }
    }

    /// Trigger shutdown on the first Ctrl-C
    pub fn listen_for_ctrl_c(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, cancelling in-flight scans");
                coordinator.trigger_shutdown();
            }
        });
    }
}
