//! Shutdown signalling for data refresh runs.
//!
//! Wraps a [`watch`] channel carrying a single boolean. Once the transmitter flips it to `true`
//! every receiver observes the shutdown, including receivers subscribed afterwards.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every subscribed receiver.
    ///
    /// Fails only when no receiver is alive anymore.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a new receiver for this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown is requested.
    ///
    /// If the transmitter is dropped without requesting shutdown this future never completes, so
    /// an abandoned channel cannot stop a run.
    pub async fn wait_for_shutdown(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn receivers_observe_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        let late_rx = tx.subscribe();

        assert!(!rx.is_shutdown());
        tx.shutdown().unwrap();

        assert!(rx.is_shutdown());
        assert!(late_rx.is_shutdown());
    }

    #[tokio::test]
    async fn wait_for_shutdown_completes_after_signal() {
        let (tx, mut rx) = create_shutdown_channel();

        let waiter = tokio::spawn(async move { rx.wait_for_shutdown().await });
        tx.shutdown().unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_transmitter_does_not_signal_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        let result = tokio::time::timeout(Duration::from_millis(20), rx.wait_for_shutdown()).await;

        assert!(result.is_err());
        assert!(!rx.is_shutdown());
    }
}
