//! Periodic connection watchdog.
//!
//! Independent of the manager's own retry schedule: every interval it asks
//! the manager to connect unless a connection is up or under way. This is
//! what recovers a manager that exhausted its reconnect attempts.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use votewire_core::{ConnectionStatus, ResourceId};

use crate::manager::{ConnectOutcome, ConnectionManager};

/// Watchdog over one [`ConnectionManager`].
#[derive(Debug)]
pub struct Supervisor {
    manager: ConnectionManager,
    resource_id: ResourceId,
}

impl Supervisor {
    /// Supervise `manager` for `resource_id`.
    pub fn new(manager: ConnectionManager, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            manager,
            resource_id: resource_id.into(),
        }
    }

    /// Run one check. Returns true if a connect was started.
    pub async fn check_once(&self) -> bool {
        match self.manager.status() {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => false,
            status @ (ConnectionStatus::Disconnected | ConnectionStatus::Error) => {
                info!(status = %status, resource_id = %self.resource_id, "supervisor reconnecting");
                match self.manager.connect(self.resource_id.clone()).await {
                    Ok(outcome) => outcome == ConnectOutcome::Started,
                    Err(err) => {
                        debug!(error = %err, "supervisor connect rejected");
                        false
                    }
                }
            }
        }
    }

    /// Check every `interval` until `cancel` fires, then disconnect.
    ///
    /// The first check runs one interval after spawning.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("supervisor cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = self.check_once().await;
                    }
                }
            }
            self.manager.disconnect().await;
        })
    }
}
