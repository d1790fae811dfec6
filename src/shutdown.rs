//! Graceful Shutdown Module
//!
//! Broadcast-based shutdown signaling: the coordinator listens for SIGINT
//! and SIGTERM and fans the shutdown out to all subscribed components.

use crate::{Result, VaultError};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Shutdown coordinator owning the broadcast channel
pub struct ShutdownCoordinator {
    shutdown_sender: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);
        Self { shutdown_sender }
    }

    /// Get a shutdown signal for a component to listen on
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal::new(self.shutdown_sender.subscribe())
    }

    /// Block until SIGINT or SIGTERM arrives, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        let mut sigint =
            signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
                VaultError::SystemError(format!("Failed to create SIGINT handler: {}", e))
            })?;
        let mut sigterm =
            signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
                VaultError::SystemError(format!("Failed to create SIGTERM handler: {}", e))
            })?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }

        self.trigger();
        Ok(())
    }

    /// Broadcast shutdown to all subscribers
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_sender.send(()) {
            // Normal when no components are listening anymore
            debug!("Shutdown signal not sent (no active receivers): {}", e);
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal wrapper for components
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    pub fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self { receiver }
    }

    /// Wait for the shutdown signal. Channel closure and lag both count as
    /// shutdown, so a component can never outlive its coordinator.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.receiver.recv().await;
    }
}
