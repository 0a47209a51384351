//! Store worker: single writer over the alert collection
//!
//! All mutations flow through one task that owns the state and
//! processes mailbox requests to completion, so an optimistic apply
//! and its rollback can never interleave with another mutation. Every
//! committed mutation bumps a monotonic sequence number; a refresh
//! result stamped with an older sequence is discarded instead of
//! clobbering newer local writes.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, SyncError};
use crate::gateway::AlertGateway;
use crate::model::{AlertDraft, AlertPatch, AlertRecord, SyncState};
use crate::normalize::normalize_alert;
use crate::outbox::OutboxRepository;

use super::StoreStatus;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests accepted by the store worker.
pub(crate) enum Request {
    Create {
        draft: AlertDraft,
        reply: Reply<AlertRecord>,
    },
    Mutate {
        id: i64,
        patch: AlertPatch,
        reply: Reply<AlertRecord>,
    },
    Delete {
        id: i64,
        reply: Reply<()>,
    },
    /// Mark the store loading and return the current mutation sequence,
    /// which stamps the refresh about to be issued.
    BeginRefresh {
        reply: oneshot::Sender<u64>,
    },
    /// Deliver the outcome of a refresh issued at `issued_seq`.
    FinishRefresh {
        outcome: Result<Vec<AlertRecord>>,
        issued_seq: u64,
        reply: Reply<Vec<AlertRecord>>,
    },
    /// Return the current mutation sequence, stamping a single fetch
    /// about to be issued.
    BeginFetch {
        reply: oneshot::Sender<u64>,
    },
    /// Upsert a fetched record, unless a newer mutation committed
    /// since the fetch was issued.
    FinishFetch {
        record: AlertRecord,
        issued_seq: u64,
        reply: Reply<AlertRecord>,
    },
    /// Upsert a gateway-confirmed record (outbox replay).
    Absorb {
        record: AlertRecord,
        reply: Reply<AlertRecord>,
    },
    /// Confirm a replayed delete.
    AbsorbDelete {
        id: i64,
        reply: Reply<()>,
    },
    MarkSync {
        id: i64,
        state: SyncState,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<AlertRecord>>,
    },
    Get {
        id: i64,
        reply: oneshot::Sender<Option<AlertRecord>>,
    },
    Status {
        reply: oneshot::Sender<StoreStatus>,
    },
    SyncStateOf {
        id: i64,
        reply: oneshot::Sender<Option<SyncState>>,
    },
}

/// Undo payload captured before an optimistic apply. Restoring it puts
/// the collection back exactly as it was before the mutation.
enum Undo {
    Reinsert(AlertRecord),
}

/// In-memory state owned by the worker.
struct StoreState {
    /// Keyed by id, so uniqueness holds by construction
    records: BTreeMap<i64, AlertRecord>,
    sync: HashMap<i64, SyncState>,
    is_loading: bool,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    /// Bumped on every committed mutation
    mutation_seq: u64,
}

impl StoreState {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            sync: HashMap::new(),
            is_loading: false,
            last_error: None,
            last_synced_at: None,
            mutation_seq: 0,
        }
    }

    /// Display order: newest first.
    fn snapshot(&self) -> Vec<AlertRecord> {
        let mut records: Vec<AlertRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Reinsert(record) => {
                self.records.insert(record.id, record);
            }
        }
    }

    /// Record a gateway-confirmed write for `id`.
    fn commit(&mut self, id: i64) {
        self.mutation_seq += 1;
        self.sync.insert(id, SyncState::Synced);
        self.last_error = None;
    }

    fn fail(&mut self, error: &SyncError) {
        self.last_error = Some(error.to_string());
    }

    fn status(&self) -> StoreStatus {
        StoreStatus {
            total: self.records.len(),
            is_loading: self.is_loading,
            last_error: self.last_error.clone(),
            last_synced_at: self.last_synced_at,
            pending_retry: self
                .sync
                .values()
                .filter(|s| **s == SyncState::PendingRetry)
                .count(),
            failed: self
                .sync
                .values()
                .filter(|s| **s == SyncState::Failed)
                .count(),
        }
    }
}

pub(crate) struct StoreWorker {
    state: StoreState,
    gateway: Arc<dyn AlertGateway>,
    outbox: Option<OutboxRepository>,
}

impl StoreWorker {
    pub(crate) fn new(gateway: Arc<dyn AlertGateway>, outbox: Option<OutboxRepository>) -> Self {
        Self {
            state: StoreState::new(),
            gateway,
            outbox,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.recv().await {
            self.handle(request).await;
        }
        tracing::debug!("Alert store worker stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Create { draft, reply } => {
                let _ = reply.send(self.handle_create(draft).await);
            }
            Request::Mutate { id, patch, reply } => {
                let _ = reply.send(self.handle_mutate(id, patch).await);
            }
            Request::Delete { id, reply } => {
                let _ = reply.send(self.handle_delete(id).await);
            }
            Request::BeginRefresh { reply } => {
                self.state.is_loading = true;
                let _ = reply.send(self.state.mutation_seq);
            }
            Request::FinishRefresh {
                outcome,
                issued_seq,
                reply,
            } => {
                let _ = reply.send(self.handle_finish_refresh(outcome, issued_seq));
            }
            Request::BeginFetch { reply } => {
                let _ = reply.send(self.state.mutation_seq);
            }
            Request::FinishFetch {
                record,
                issued_seq,
                reply,
            } => {
                let _ = reply.send(self.handle_finish_fetch(record, issued_seq));
            }
            Request::Absorb { record, reply } => {
                let id = record.id;
                self.state.records.insert(id, record.clone());
                self.state.commit(id);
                let _ = reply.send(Ok(record));
            }
            Request::AbsorbDelete { id, reply } => {
                self.state.records.remove(&id);
                self.state.sync.remove(&id);
                self.state.mutation_seq += 1;
                let _ = reply.send(Ok(()));
            }
            Request::MarkSync { id, state, reply } => {
                self.state.sync.insert(id, state);
                let _ = reply.send(Ok(()));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            Request::Get { id, reply } => {
                let _ = reply.send(self.state.records.get(&id).cloned());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.state.status());
            }
            Request::SyncStateOf { id, reply } => {
                let _ = reply.send(self.state.sync.get(&id).copied());
            }
        }
    }

    async fn handle_create(&mut self, draft: AlertDraft) -> Result<AlertRecord> {
        // Local preconditions are checked before the gateway sees anything
        draft.validate()?;

        match self.gateway.create(&draft).await {
            Ok(payload) => {
                let record = normalize_alert(&payload);
                tracing::info!("Created alert {}", record.id);
                // Replaces any same-id entry, keeping ids unique
                self.state.records.insert(record.id, record.clone());
                self.state.commit(record.id);
                Ok(record)
            }
            Err(error) => {
                tracing::warn!("Create failed: {}", error);
                self.state.fail(&error);
                // No placeholder is inserted; the draft goes to the
                // outbox instead so the write is not silently dropped.
                if error.is_retryable() {
                    self.enqueue_create(&draft).await;
                }
                Err(error)
            }
        }
    }

    async fn handle_mutate(&mut self, id: i64, patch: AlertPatch) -> Result<AlertRecord> {
        patch.validate()?;

        let current = self
            .state
            .records
            .get(&id)
            .ok_or(SyncError::AlertNotFound(id))?;

        if let Some(next) = patch.status {
            // Re-requesting the current status is an idempotent no-op
            if current.status == next {
                return Ok(current.clone());
            }
            if !current.status.can_transition_to(next) {
                return Err(SyncError::ValidationFailed(format!(
                    "Invalid status transition {:?} -> {:?}",
                    current.status, next
                )));
            }
        }

        // Optimistic apply with an undo payload for rollback
        let snapshot = current.clone();
        let undo = Undo::Reinsert(snapshot);
        if let Some(record) = self.state.records.get_mut(&id) {
            patch.apply_to(record);
        }

        match self.gateway.update(id, &patch).await {
            Ok(payload) => {
                // The server response is authoritative
                let record = normalize_alert(&payload);
                tracing::debug!("Updated alert {}", id);
                self.state.records.remove(&id);
                self.state.records.insert(record.id, record.clone());
                self.state.commit(record.id);
                Ok(record)
            }
            Err(error) => {
                tracing::warn!("Update of alert {} failed, rolling back: {}", id, error);
                self.state.revert(undo);
                self.state.fail(&error);
                if error.is_retryable() && self.outbox.is_some() {
                    self.enqueue_update(id, &patch).await;
                    self.state.sync.insert(id, SyncState::PendingRetry);
                }
                Err(error)
            }
        }
    }

    async fn handle_delete(&mut self, id: i64) -> Result<()> {
        let snapshot = self
            .state
            .records
            .remove(&id)
            .ok_or(SyncError::AlertNotFound(id))?;

        match self.gateway.delete(id).await {
            // AlreadyGone (404) is success: absence is the desired end state
            Ok(_) => {
                tracing::info!("Deleted alert {}", id);
                self.state.sync.remove(&id);
                self.state.mutation_seq += 1;
                self.state.last_error = None;
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Delete of alert {} failed, restoring: {}", id, error);
                self.state.revert(Undo::Reinsert(snapshot));
                self.state.fail(&error);
                if error.is_retryable() && self.outbox.is_some() {
                    self.enqueue_delete(id).await;
                    self.state.sync.insert(id, SyncState::PendingRetry);
                }
                Err(error)
            }
        }
    }

    fn handle_finish_refresh(
        &mut self,
        outcome: Result<Vec<AlertRecord>>,
        issued_seq: u64,
    ) -> Result<Vec<AlertRecord>> {
        self.state.is_loading = false;

        let records = match outcome {
            Ok(records) => records,
            Err(error) => {
                // Stale-but-present beats empty: existing records stay
                tracing::warn!("Refresh failed, keeping current records: {}", error);
                self.state.fail(&error);
                return Err(error);
            }
        };

        if self.state.mutation_seq != issued_seq {
            tracing::debug!(
                "Discarding stale refresh (issued at seq {}, now at {})",
                issued_seq,
                self.state.mutation_seq
            );
            return Ok(self.state.snapshot());
        }

        // Replace wholesale, never merge
        self.state.records = records.into_iter().map(|r| (r.id, r)).collect();
        let StoreState { records, sync, .. } = &mut self.state;
        sync.retain(|id, _| records.contains_key(id));
        self.state.last_synced_at = Some(Utc::now());
        self.state.last_error = None;
        Ok(self.state.snapshot())
    }

    /// A fetched payload is a read, not a confirmed write: if any
    /// mutation committed while it was in flight, the payload may
    /// predate that mutation and is discarded. The caller gets the
    /// current record instead, which may no longer exist.
    fn handle_finish_fetch(&mut self, record: AlertRecord, issued_seq: u64) -> Result<AlertRecord> {
        let id = record.id;

        if self.state.mutation_seq != issued_seq {
            tracing::debug!(
                "Discarding stale fetch of alert {} (issued at seq {}, now at {})",
                id,
                issued_seq,
                self.state.mutation_seq
            );
            return self
                .state
                .records
                .get(&id)
                .cloned()
                .ok_or(SyncError::AlertNotFound(id));
        }

        self.state.records.insert(id, record.clone());
        self.state.commit(id);
        Ok(record)
    }

    async fn enqueue_create(&mut self, draft: &AlertDraft) {
        let Some(outbox) = &self.outbox else { return };
        match outbox.enqueue_create(draft).await {
            Ok(entry) => tracing::info!("Queued failed create as outbox entry {}", entry.id),
            Err(e) => tracing::error!("Failed to enqueue create in outbox: {}", e),
        }
    }

    async fn enqueue_update(&mut self, id: i64, patch: &AlertPatch) {
        let Some(outbox) = &self.outbox else { return };
        match outbox.enqueue_update(id, patch).await {
            Ok(entry) => tracing::info!("Queued failed update as outbox entry {}", entry.id),
            Err(e) => tracing::error!("Failed to enqueue update in outbox: {}", e),
        }
    }

    async fn enqueue_delete(&mut self, id: i64) {
        let Some(outbox) = &self.outbox else { return };
        match outbox.enqueue_delete(id).await {
            Ok(entry) => tracing::info!("Queued failed delete as outbox entry {}", entry.id),
            Err(e) => tracing::error!("Failed to enqueue delete in outbox: {}", e),
        }
    }
}
