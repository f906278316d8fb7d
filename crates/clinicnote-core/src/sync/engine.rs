//! Sync engine (reconciler)
//!
//! One engine instance per client session, constructed with injected
//! dependencies. A reconciliation pass pulls each entity type's
//! canonical remote set, then pushes every `synced=false` document
//! through the gateway. At most one pass is in flight at a time;
//! overlapping triggers are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::db::RemoteApplyOutcome;
use crate::error::Result;
use crate::gateway::RemoteGateway;
use crate::models::{DocumentKey, EntityType, LocalDocument};
use crate::store::DocumentStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_MAX_PUSH_ATTEMPTS: u32 = 5;

/// Diagnostics emitted while reconciling. Observable by tests and by a
/// last-synced indicator in the UI; never required for correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A full pass finished (possibly with per-document failures)
    PassCompleted(PassSummary),
    /// A pull for this key was suppressed by a pending local edit
    ConflictSkipped { key: DocumentKey },
    /// The authority rejected the credential; re-authentication needed
    AuthRequired,
    /// A push failed; `terminal` means the document has been parked
    /// and will not be retried until it is written again
    PushFailed { key: DocumentKey, terminal: bool },
}

/// Counts for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub pulled: usize,
    pub pushed: usize,
    pub conflicts_skipped: usize,
    pub failures: usize,
}

/// Result of requesting a full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(PassSummary),
    /// Another pass was already in flight; this trigger was dropped
    AlreadySyncing,
}

enum PushStatus {
    Acked,
    Failed,
    AuthFailed,
}

/// Orchestrates pull and push between the local store and the remote
/// authority.
pub struct SyncEngine {
    store: DocumentStore,
    gateway: Arc<dyn RemoteGateway>,
    monitor: ConnectivityMonitor,
    events: broadcast::Sender<SyncEvent>,
    syncing: AtomicBool,
    push_attempts: Mutex<HashMap<DocumentKey, u32>>,
    max_push_attempts: u32,
    sync_interval: Duration,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        store: DocumentStore,
        gateway: Arc<dyn RemoteGateway>,
        monitor: ConnectivityMonitor,
        sync_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            gateway,
            monitor,
            events,
            syncing: AtomicBool::new(false),
            push_attempts: Mutex::new(HashMap::new()),
            max_push_attempts: DEFAULT_MAX_PUSH_ATTEMPTS,
            sync_interval,
        }
    }

    /// Override the terminal-failure threshold for rejected pushes.
    #[must_use]
    pub const fn with_max_push_attempts(mut self, attempts: u32) -> Self {
        self.max_push_attempts = attempts;
        self
    }

    /// Subscribe to sync diagnostics events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The store this engine reconciles.
    #[must_use]
    pub const fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Persist a local write, then push that one document immediately
    /// when online. The local commit always decides the return value;
    /// remote propagation is best-effort and never fails the call.
    pub async fn save(&self, entity_type: EntityType, payload: Value) -> Result<LocalDocument> {
        let doc = self.store.save(entity_type, payload).await?;

        // A fresh write gets a fresh retry budget.
        self.push_attempts.lock().await.remove(&doc.key);

        if self.monitor.is_online() {
            if let Err(error) = self.push_document(&doc).await {
                tracing::error!(key = %doc.key, "storage failure during immediate push: {error}");
            }
        }

        Ok(doc)
    }

    /// Delete a document locally, then push the remote delete when one
    /// is owed and the client is online.
    pub async fn delete(&self, entity_type: EntityType, id: &str) -> Result<()> {
        let tombstone = self.store.delete(entity_type, id).await?;

        let Some(tombstone) = tombstone else {
            // Never pushed; nothing exists remotely.
            return Ok(());
        };

        self.push_attempts.lock().await.remove(&tombstone.key);

        if self.monitor.is_online() {
            if let Err(error) = self.push_document(&tombstone).await {
                tracing::error!(
                    key = %tombstone.key,
                    "storage failure during immediate delete push: {error}"
                );
            }
        }

        Ok(())
    }

    /// Run one full reconciliation pass (pull then push). Dropped when
    /// a pass is already in flight.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("reconciliation already in flight; trigger dropped");
            return Ok(SyncOutcome::AlreadySyncing);
        }

        let result = self.run_pass().await;
        self.syncing.store(false, Ordering::SeqCst);

        let summary = result?;
        tracing::info!(
            pulled = summary.pulled,
            pushed = summary.pushed,
            conflicts_skipped = summary.conflicts_skipped,
            failures = summary.failures,
            "reconciliation pass completed"
        );
        let _ = self.events.send(SyncEvent::PassCompleted(summary.clone()));
        Ok(SyncOutcome::Completed(summary))
    }

    /// Spawn the background driver with the built-in periodic timer.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let interval = self.sync_interval;
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip it so the
            // timer only fires after one full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tick_tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        self.start_with_ticks(tick_rx, Some(timer))
    }

    /// Spawn the background driver with an injected tick source. Tests
    /// drive ticks manually instead of waiting for real time.
    pub fn start_with_ticks(
        self: &Arc<Self>,
        mut ticks: mpsc::Receiver<()>,
        timer: Option<JoinHandle<()>>,
    ) -> SyncHandle {
        let engine = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut connectivity = self.monitor.subscribe();

        let driver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    tick = ticks.recv() => {
                        if tick.is_none() {
                            break;
                        }
                        if engine.monitor.is_online() {
                            engine.run_triggered_pass("periodic tick").await;
                        }
                    }
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if connectivity.borrow_and_update().is_online() {
                            engine.run_triggered_pass("connectivity regained").await;
                        }
                    }
                }
            }
        });

        SyncHandle {
            shutdown: shutdown_tx,
            driver,
            timer,
        }
    }

    async fn run_triggered_pass(&self, trigger: &str) {
        tracing::debug!(trigger, "reconciliation triggered");
        if let Err(error) = self.sync_now().await {
            tracing::error!(trigger, "reconciliation pass failed: {error}");
        }
    }

    async fn run_pass(&self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let proceed = self.pull_phase(&mut summary).await?;
        if proceed {
            self.push_phase(&mut summary).await?;
        }
        Ok(summary)
    }

    /// Pull each entity type's canonical remote set. Each type fails
    /// independently; an auth rejection aborts the whole pass.
    async fn pull_phase(&self, summary: &mut PassSummary) -> Result<bool> {
        for entity_type in EntityType::ALL {
            let records = match self.gateway.list(entity_type).await {
                Ok(records) => records,
                Err(error) if error.is_auth() => {
                    tracing::warn!(entity = %entity_type, "credential rejected during pull: {error}");
                    let _ = self.events.send(SyncEvent::AuthRequired);
                    return Ok(false);
                }
                Err(error) => {
                    tracing::warn!(entity = %entity_type, "pull failed: {error}");
                    continue;
                }
            };

            for record in records {
                let Some(remote_id) = record_id(&record) else {
                    tracing::warn!(entity = %entity_type, "remote record without id skipped");
                    continue;
                };

                match self.store.apply_remote(entity_type, &remote_id, &record).await? {
                    RemoteApplyOutcome::Applied(_) => summary.pulled += 1,
                    RemoteApplyOutcome::SkippedPendingEdit(key) => {
                        tracing::debug!(%key, "pull suppressed by pending local edit");
                        summary.conflicts_skipped += 1;
                        let _ = self.events.send(SyncEvent::ConflictSkipped { key });
                    }
                }
            }
        }

        Ok(true)
    }

    /// Push the outbox in local modification order. One failing
    /// document never aborts the rest.
    async fn push_phase(&self, summary: &mut PassSummary) -> Result<()> {
        for doc in self.store.list_unsynced().await? {
            if self.is_parked(&doc.key).await {
                tracing::debug!(key = %doc.key, "document parked after repeated rejections");
                continue;
            }

            match self.push_document(&doc).await? {
                PushStatus::Acked => summary.pushed += 1,
                PushStatus::Failed => summary.failures += 1,
                PushStatus::AuthFailed => {
                    summary.failures += 1;
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Push one document: remote delete for tombstones, update when a
    /// remote id is known, create otherwise. Gateway failures are
    /// absorbed here; only storage failures propagate.
    async fn push_document(&self, doc: &LocalDocument) -> Result<PushStatus> {
        let entity_type = doc.key.entity_type;

        let result = if doc.deleted {
            match &doc.remote_id {
                Some(remote_id) => self.gateway.delete(entity_type, remote_id).await.map(|()| None),
                None => {
                    // Tombstone for a document that never reached the
                    // remote; nothing to delete there.
                    self.store.remove(&doc.key, doc.last_modified_locally).await?;
                    return Ok(PushStatus::Acked);
                }
            }
        } else if let Some(remote_id) = &doc.remote_id {
            self.gateway
                .update(entity_type, remote_id, &doc.payload)
                .await
                .map(Some)
        } else {
            self.gateway.create(entity_type, &doc.payload).await.map(Some)
        };

        match result {
            Ok(None) => {
                if self.store.remove(&doc.key, doc.last_modified_locally).await? {
                    tracing::debug!(key = %doc.key, "remote delete acknowledged");
                } else {
                    tracing::debug!(
                        key = %doc.key,
                        "document rewritten during delete push; kept in outbox"
                    );
                }
                self.push_attempts.lock().await.remove(&doc.key);
                Ok(PushStatus::Acked)
            }
            Ok(Some(record)) => {
                let remote_id = record_id(&record)
                    .or_else(|| doc.remote_id.clone())
                    .unwrap_or_else(|| doc.key.entity_id.clone());
                // The ack covers the payload read at scan time; a
                // newer local write stays pending for the next pass.
                if self
                    .store
                    .mark_synced(&doc.key, &remote_id, doc.last_modified_locally)
                    .await?
                {
                    tracing::debug!(key = %doc.key, remote_id, "push acknowledged");
                } else {
                    tracing::debug!(key = %doc.key, "document rewritten during push; kept in outbox");
                }
                self.push_attempts.lock().await.remove(&doc.key);
                Ok(PushStatus::Acked)
            }
            Err(error) if error.is_auth() => {
                tracing::warn!(key = %doc.key, "credential rejected during push: {error}");
                let _ = self.events.send(SyncEvent::AuthRequired);
                Ok(PushStatus::AuthFailed)
            }
            Err(error) => {
                let terminal = if error.is_rejection() {
                    self.bump_attempts(&doc.key).await
                } else {
                    false
                };
                tracing::warn!(key = %doc.key, terminal, "push failed, will retry: {error}");
                let _ = self.events.send(SyncEvent::PushFailed {
                    key: doc.key.clone(),
                    terminal,
                });
                Ok(PushStatus::Failed)
            }
        }
    }

    async fn is_parked(&self, key: &DocumentKey) -> bool {
        self.push_attempts
            .lock()
            .await
            .get(key)
            .is_some_and(|attempts| *attempts >= self.max_push_attempts)
    }

    /// Count a rejection; returns `true` when the document just hit
    /// the terminal threshold.
    async fn bump_attempts(&self, key: &DocumentKey) -> bool {
        let mut attempts = self.push_attempts.lock().await;
        let count = attempts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count >= self.max_push_attempts
    }
}

/// Handle to the background driver; shutting down stops the periodic
/// timer and the connectivity subscription.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    driver: JoinHandle<()>,
    timer: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Stop the driver, waiting for an in-flight pass to finish.
    pub async fn shutdown(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        let _ = self.shutdown.send(true);
        let _ = self.driver.await;
    }
}

/// Remote record id as a string; the authority uses both string and
/// integer ids depending on the entity.
fn record_id(record: &Value) -> Option<String> {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
