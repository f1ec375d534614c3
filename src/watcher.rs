//! Unit watcher: pulls delta batches, classifies them, flushes events.
//!
//! One task owns the snapshot, the membership view and the pending queue.
//! Waiting for the next batch is the only long suspension point; the fixed
//! delay between cycles only bounds the request rate against the model.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::cluster::{ActionOutcome, Cluster, invoke_on_leader};
use crate::error::{Error, Result};
use crate::model::{ChangeKind, Delta, DomainEvent};
use crate::snapshot::ActiveUnits;
use crate::store::{EventStore, EventWriter};
use crate::telemetry::metrics;
use crate::telemetry::watch::{record_batch_events, start_batch_span};

/// Action sent to the governor leader after events are persisted.
pub const DEFAULT_ACTION: &str = "governor-event";

/// Configuration for the unit watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Name of the governor application. Its units are never tracked.
    pub governor: String,
    /// Action run on the governor leader after a successful flush.
    pub action: String,
    /// Delay between consecutive polls.
    pub poll_interval: Duration,
}

impl WatcherConfig {
    pub fn new(governor: impl Into<String>) -> Self {
        Self {
            governor: governor.into(),
            action: DEFAULT_ACTION.to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Cloneable handle that stops a running watcher.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run` return at its next suspension point.
    pub fn shutdown(&self) {
        self.0.notify_one();
    }

    async fn requested(&self) {
        self.0.notified().await;
    }
}

/// What a flush attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every pending event was written and the governor was notified.
    Flushed { written: usize, action: ActionOutcome },
    /// The store was locked; `remaining` events stay queued for the next cycle.
    Deferred { written: usize, remaining: usize },
}

pub struct UnitWatcher<C, S> {
    cluster: Arc<C>,
    store: S,
    config: WatcherConfig,
    active: ActiveUnits,
    membership: BTreeSet<String>,
    pending: VecDeque<DomainEvent>,
    shutdown: ShutdownHandle,
}

impl<C: Cluster, S: EventStore> UnitWatcher<C, S> {
    pub fn new(cluster: Arc<C>, store: S, config: WatcherConfig) -> Self {
        Self {
            cluster,
            store,
            config,
            active: ActiveUnits::new(),
            membership: BTreeSet::new(),
            pending: VecDeque::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Use an externally created shutdown handle.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Replace the snapshot and membership view.
    pub fn with_state(mut self, active: ActiveUnits, membership: BTreeSet<String>) -> Self {
        self.active = active;
        self.membership = membership;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn active(&self) -> &ActiveUnits {
        &self.active
    }

    pub fn membership(&self) -> &BTreeSet<String> {
        &self.membership
    }

    pub fn pending(&self) -> &VecDeque<DomainEvent> {
        &self.pending
    }

    /// Seed the snapshot and membership view from the model status.
    pub async fn initialize(&mut self) -> Result<()> {
        let applications = self.cluster.applications().await?;

        self.active = ActiveUnits::initialize(&applications, &self.config.governor);
        self.membership = applications
            .iter()
            .flat_map(|app| app.units.iter().map(|unit| unit.name.clone()))
            .collect();

        info!(
            active = self.active.len(),
            known = self.membership.len(),
            "unit watcher initialized"
        );
        Ok(())
    }

    /// Initialize, then consume the watcher's first batch (the initial state dump).
    ///
    /// The dump only updates the membership view; it produces no events.
    /// Returns false if shutdown was requested while priming.
    pub async fn start(&mut self) -> Result<bool> {
        self.initialize().await?;

        let batch = tokio::select! {
            _ = self.shutdown.requested() => return Ok(false),
            batch = self.cluster.next_deltas() => batch?,
        };

        for delta in batch.iter().filter_map(|raw| Delta::parse(raw).ok()) {
            self.track_membership(&delta);
        }
        debug!(
            deltas = batch.len(),
            known = self.membership.len(),
            "primed from initial delta batch"
        );
        Ok(true)
    }

    /// Run the watch loop until shutdown or a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        info!(governor = %self.config.governor, "unit watcher running");

        loop {
            if !self.pending.is_empty() {
                self.flush_and_report().await?;
            }

            let batch = tokio::select! {
                _ = self.shutdown.requested() => break,
                batch = self.cluster.next_deltas() => batch?,
            };

            self.process_batch(&batch);

            if !self.pending.is_empty() {
                self.flush_and_report().await?;
            }

            tokio::select! {
                _ = self.shutdown.requested() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "shutting down with unflushed events");
        }
        info!("unit watcher shutting down");
        Ok(())
    }

    /// Classify a batch of raw deltas, queueing the events they produce.
    ///
    /// Returns the number of events queued. Malformed deltas are skipped.
    pub fn process_batch(&mut self, batch: &[Value]) -> usize {
        let span = start_batch_span(batch.len());
        let _enter = span.enter();

        let mut seen = self.membership.clone();
        let mut queued = 0;

        for raw in batch {
            let delta = match Delta::parse(raw) {
                Ok(delta) => delta,
                Err(e) => {
                    warn!(error = %e, "skipping malformed delta");
                    metrics::deltas_malformed().add(1, &[]);
                    continue;
                }
            };

            for event in classify(&delta, &self.config.governor, &mut seen, &mut self.active) {
                metrics::events_synthesized().add(1, &[KeyValue::new("event", event.name())]);
                self.pending.push_back(event);
                queued += 1;
            }

            self.track_membership(&delta);
        }

        record_batch_events(&span, queued);
        queued
    }

    fn track_membership(&mut self, delta: &Delta) {
        if !delta.is_unit() {
            return;
        }
        match delta.change {
            ChangeKind::Change => {
                self.membership.insert(delta.entity_id.clone());
            }
            ChangeKind::Remove => {
                self.membership.remove(&delta.entity_id);
            }
        }
    }

    /// Write pending events in order, then notify the governor once.
    ///
    /// An event leaves the queue only after its write succeeded. Store lock
    /// contention stops the flush and keeps the rest queued; no action is
    /// sent for that cycle. Any other store error is returned.
    pub async fn flush(&mut self) -> Result<FlushOutcome> {
        let mut writer = match self.store.open() {
            Ok(writer) => writer,
            Err(Error::StoreLocked) => return Ok(self.deferred(0)),
            Err(e) => return Err(e),
        };

        let mut written = 0;
        while let Some(event) = self.pending.front() {
            match writer.write(event) {
                Ok(()) => {
                    self.pending.pop_front();
                    written += 1;
                }
                Err(Error::StoreLocked) => {
                    if let Err(e) = writer.close() {
                        debug!(error = %e, "closing locked store");
                    }
                    metrics::events_persisted().add(written as u64, &[]);
                    return Ok(self.deferred(written));
                }
                Err(e) => return Err(e),
            }
        }
        writer.close()?;
        metrics::events_persisted().add(written as u64, &[]);

        let action =
            match invoke_on_leader(self.cluster.as_ref(), &self.config.governor, &self.config.action)
                .await
            {
                Ok(action) => action,
                Err(e) => {
                    metrics::actions_invoked().add(1, &[KeyValue::new("result", "error")]);
                    return Err(e);
                }
            };
        let result = match action {
            ActionOutcome::Sent { .. } => "sent",
            ActionOutcome::NoLeader => "no_leader",
        };
        metrics::actions_invoked().add(1, &[KeyValue::new("result", result)]);

        Ok(FlushOutcome::Flushed { written, action })
    }

    fn deferred(&self, written: usize) -> FlushOutcome {
        metrics::store_locked().add(1, &[]);
        warn!(
            written,
            remaining = self.pending.len(),
            "event store locked, retrying next cycle"
        );
        FlushOutcome::Deferred {
            written,
            remaining: self.pending.len(),
        }
    }

    async fn flush_and_report(&mut self) -> Result<()> {
        match self.flush().await {
            Ok(FlushOutcome::Flushed { written, action }) => {
                info!(written, ?action, "events flushed");
                Ok(())
            }
            Ok(FlushOutcome::Deferred { .. }) => Ok(()),
            Err(e @ Error::Action(_)) => {
                // Events are already durable; the governor picks them up on its next wake.
                error!(error = %e, "governor action failed after flush");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
