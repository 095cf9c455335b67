//! Cooperative shutdown signal.
//!
//! `Shutdown` is held by whoever decides the process should stop;
//! `ShutdownSignal` clones are handed to the loops that must observe it.

use std::sync::Arc;

use tokio::sync::watch;

/// Trigger side of the shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// A receiver observing this shutdown.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
            _sender: None,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Observer side of the shutdown signal.
///
/// Dropping the `Shutdown` counts as triggering it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
    /// Set only for `never()`, which owns its own sender.
    _sender: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownSignal {
    /// A signal that is never triggered.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _sender: Some(Arc::new(sender)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolve once shutdown is triggered. Cancel-safe.
    pub async fn wait(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
