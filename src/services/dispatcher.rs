//! Event and periodic-sync dispatch
//!
//! Two long-lived tasks feed the [`Reconciler`]: the push loop turns every
//! notification into an aggregate valve observation, the periodic loop
//! refreshes the full snapshot on a fixed interval and scans it. The periodic
//! path is the backstop for missed or malformed events.

use crate::client::{DeviceSnapshot, DeviceStateClient, NotificationEvent};
use crate::error::{ErrorSeverity, Result, ValveSwitchError};
use crate::services::reconciler::{Reconciler, Transition, TriggerSource};
use crate::services::valve_extractor::{any_open, ValveSignalExtractor};
use crate::services::valve_scanner::SnapshotValveScanner;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatch counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    pub events_received: u64,
    /// Events that carried no valve readings
    pub events_ignored: u64,
    pub decode_failures: u64,
    pub syncs: u64,
    pub sync_failures: u64,
    pub transitions: u64,
    pub command_failures: u64,
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
}

/// Routes push events and periodic snapshots into the reconciler
pub struct Dispatcher {
    client: Arc<dyn DeviceStateClient>,
    reconciler: Arc<Reconciler>,
    extractor: ValveSignalExtractor,
    scanner: SnapshotValveScanner,
    sync_interval: Duration,
    sync_on_startup: bool,
    stats: RwLock<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn DeviceStateClient>,
        reconciler: Arc<Reconciler>,
        valve_device_type: &str,
        sync_interval: Duration,
    ) -> Self {
        Self {
            client,
            reconciler,
            extractor: ValveSignalExtractor::new(valve_device_type),
            scanner: SnapshotValveScanner::new(valve_device_type),
            sync_interval,
            sync_on_startup: true,
            stats: RwLock::new(DispatchStats::default()),
        }
    }

    /// Enable or disable the full sync before the loops start
    pub fn with_startup_sync(mut self, enabled: bool) -> Self {
        self.sync_on_startup = enabled;
        self
    }

    /// Handle one push notification.
    ///
    /// Returns `Ok(None)` when the event carried no valve readings (including
    /// undecodable payloads); such events never touch the switch state.
    pub async fn handle_event(&self, event: &NotificationEvent) -> Result<Option<Transition>> {
        self.stats.write().await.events_received += 1;

        let readings = match self.extractor.extract(event) {
            Ok(readings) => readings,
            Err(e) => {
                self.stats.write().await.decode_failures += 1;
                warn!(source = "event", bytes = ?event.payload_len(), "Undecodable push payload: {}", e);
                Vec::new()
            }
        };

        if readings.is_empty() {
            self.stats.write().await.events_ignored += 1;
            info!(source = "event", "No valve data in event, ignoring");
            return Ok(None);
        }

        let open = any_open(&readings);
        debug!(
            source = "event",
            readings = readings.len(),
            any_open = open,
            "Valve readings from event"
        );

        let outcome = self.reconciler.reconcile(open, TriggerSource::Event).await;
        self.record(&outcome).await;
        outcome.map(Some)
    }

    /// Refresh the snapshot, scan it and reconcile
    pub async fn full_sync(&self, source: TriggerSource) -> Result<Transition> {
        self.stats.write().await.syncs += 1;

        if let Err(e) = self.client.refresh_snapshot().await {
            self.stats.write().await.sync_failures += 1;
            return Err(e);
        }

        let snapshot = self.client.snapshot().await;
        self.reconcile_snapshot(&snapshot, source).await
    }

    /// Startup sync; scans the cached snapshot when one was already fetched
    pub async fn startup_sync(&self) -> Result<Transition> {
        let cached = self.client.snapshot().await;
        if cached.fetched_at.is_none() {
            return self.full_sync(TriggerSource::Startup).await;
        }

        self.stats.write().await.syncs += 1;
        debug!(source = "startup", "Using snapshot fetched during startup");
        self.reconcile_snapshot(&cached, TriggerSource::Startup).await
    }

    async fn reconcile_snapshot(
        &self,
        snapshot: &DeviceSnapshot,
        source: TriggerSource,
    ) -> Result<Transition> {
        let summary = self.scanner.scan(snapshot);
        if summary.valve_devices == 0 {
            warn!(source = %source, "No valve devices found among {} devices", snapshot.len());
        }
        info!(
            source = %source,
            valve_devices = summary.valve_devices,
            open_channels = summary.open_channels,
            "🔄 Sync: {} of {} valve channels open",
            summary.open_channels,
            summary.reporting_channels
        );
        self.stats.write().await.last_sync = Some(chrono::Utc::now());

        let outcome = self.reconciler.reconcile(summary.any_open(), source).await;
        self.record(&outcome).await;
        outcome
    }

    /// Consume push notifications until cancelled or the stream ends
    pub async fn run_push_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<NotificationEvent>,
        cancel: CancellationToken,
    ) {
        info!("📡 Listening for push events");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Push loop cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            warn!(source = "event", "Event reconciliation failed: {}", e);
                        }
                    }
                    None => {
                        warn!("⚠️ Push stream ended, relying on periodic sync");
                        break;
                    }
                }
            }
        }
    }

    /// Full sync every interval until cancelled; the first one fires one interval after start
    pub async fn run_periodic_sync(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.sync_interval, self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("⏰ Periodic sync every {}s", self.sync_interval.as_secs());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Periodic sync cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.full_sync(TriggerSource::PeriodicSync).await {
                        if e.severity() == ErrorSeverity::Critical {
                            error!(source = "sync", error_type = e.error_type(), "Periodic sync failed: {}", e);
                        } else {
                            warn!(
                                source = "sync",
                                error_type = e.error_type(),
                                retryable = e.is_retryable(),
                                "Periodic sync failed: {}",
                                e
                            );
                        }
                    }
                }
            }
        }
    }

    /// Run the optional startup sync, then both loops until cancellation
    pub async fn run(
        self: Arc<Self>,
        events: mpsc::UnboundedReceiver<NotificationEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.sync_on_startup {
            if let Err(e) = self.startup_sync().await {
                warn!(source = "startup", "Startup sync failed: {}", e);
            }
        }

        let push = tokio::spawn(self.clone().run_push_loop(events, cancel.clone()));
        let periodic = tokio::spawn(self.clone().run_periodic_sync(cancel));

        let (push_result, periodic_result) = tokio::join!(push, periodic);
        push_result.map_err(|e| ValveSwitchError::internal(format!("push loop failed: {e}")))?;
        periodic_result
            .map_err(|e| ValveSwitchError::internal(format!("periodic sync failed: {e}")))?;

        let stats = self.stats().await;
        info!(
            events = stats.events_received,
            ignored = stats.events_ignored,
            syncs = stats.syncs,
            transitions = stats.transitions,
            command_failures = stats.command_failures,
            "📊 Dispatcher stopped"
        );
        Ok(())
    }

    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }

    async fn record(&self, outcome: &Result<Transition>) {
        let mut stats = self.stats.write().await;
        match outcome {
            Ok(transition) if transition.is_switch() => stats.transitions += 1,
            Ok(_) => {}
            Err(_) => stats.command_failures += 1,
        }
    }
}
