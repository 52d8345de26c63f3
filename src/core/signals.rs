/// Cross-task signals: the admin reload request and process shutdown.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};
use tracing::{info, warn};

/// Set by the admin endpoint after it rewrites configuration, consumed by the supervisor
#[derive(Debug, Clone, Default)]
pub struct ReloadFlag {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ReloadFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Resolve once a reload is pending
    pub async fn requested(&self) {
        while !self.is_requested() {
            self.wake.notified().await;
        }
    }
}

/// Receiving side of the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Sender plus a receiver for it
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. Pends forever if the sender is gone without
    /// ever triggering.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Turn Ctrl-C and SIGTERM into a shutdown request
pub fn listen_for_shutdown(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested");
        let _ = tx.send(true);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reload_flag_take() {
        let flag = ReloadFlag::new();
        let handle = flag.clone();
        assert!(!flag.take());
        handle.request();
        assert!(flag.is_requested());
        assert!(flag.take());
        assert!(!flag.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_wakes_waiter() {
        let flag = ReloadFlag::new();
        let handle = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            handle.request();
        });
        tokio::time::timeout(Duration::from_secs(10), flag.requested())
            .await
            .unwrap();
        assert!(flag.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_resolves_after_send() {
        let (tx, mut shutdown) = Shutdown::channel();
        assert!(!shutdown.is_triggered());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        });
        shutdown.triggered().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_never_triggers() {
        let (tx, mut shutdown) = Shutdown::channel();
        drop(tx);
        let waited =
            tokio::time::timeout(Duration::from_secs(60), shutdown.triggered()).await;
        assert!(waited.is_err());
    }
}
