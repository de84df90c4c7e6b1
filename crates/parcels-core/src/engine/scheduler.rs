//! Poll scheduler
//!
//! Drives [`ParcelService::poll_due`] on a fixed interval.
//!
//! ## States
//!
//! ```text
//! Idle ──tick──▶ Ticking ──done──▶ Idle ... ──shutdown──▶ Stopped
//! ```
//!
//! The first tick fires immediately on start. Shutdown is observed between
//! ticks only: a tick in progress finishes before the loop exits. Ticks
//! missed while a slow tick runs are not replayed.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::ParcelService;
use crate::error::Result;

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// Reconciling due trackings
    Ticking,
    /// Loop exited
    Stopped,
}

/// Recurring poll loop over a [`ParcelService`]
#[derive(Debug)]
pub struct PollScheduler {
    service: ParcelService,
    interval: Duration,
    state_tx: watch::Sender<SchedulerState>,
}

impl PollScheduler {
    /// Create a scheduler ticking at the service's polling interval
    pub fn new(service: ParcelService) -> Self {
        let interval = service.polling_interval();
        Self::with_interval(service, interval)
    }

    /// Create a scheduler with an explicit tick interval
    ///
    /// The age after which a tracking is due stays the service's polling
    /// interval.
    pub fn with_interval(service: ParcelService, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            service,
            interval,
            state_tx,
        }
    }

    /// Watch the scheduler state
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Current scheduler state
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Run until ctrl-c
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await
    }

    /// Run until `shutdown` resolves
    ///
    /// Polling errors are logged and never end the loop. The store is
    /// flushed on exit.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Poll scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    self.state_tx.send_replace(SchedulerState::Ticking);
                    if let Err(e) = self.service.poll_due().await {
                        error!(error = %e, "Polling failed");
                    }
                    self.state_tx.send_replace(SchedulerState::Idle);
                }
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);

        self.service.flush_store().await?;
        info!("Store flushed, poll scheduler stopped");

        Ok(())
    }
}
