//! Optimistic alert store
//!
//! In-memory collection of canonical alert records kept consistent
//! with the remote gateway. Mutations apply locally first and
//! reconcile with the gateway's response, rolling back on failure;
//! a refresh replaces the collection wholesale, unless a newer local
//! mutation has landed since the refresh was issued.
//!
//! The store is a handle over a single-writer worker task; cloning the
//! handle shares the same state.

mod worker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, SyncError};
use crate::gateway::AlertGateway;
use crate::model::{AlertDraft, AlertPatch, AlertRecord, AlertStatus, SyncState};
use crate::normalize::{normalize_alert, normalize_collection};
use crate::outbox::OutboxRepository;

use worker::{Request, StoreWorker};

/// Mailbox depth for the store worker
const MAILBOX_CAPACITY: usize = 64;

/// Aggregate store health exposed to the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub total: usize,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Records with a failed write queued for replay
    pub pending_retry: usize,
    /// Records whose queued write was abandoned
    pub failed: usize,
}

/// Handle to the optimistic alert store
#[derive(Clone)]
pub struct AlertStore {
    tx: mpsc::Sender<Request>,
    gateway: Arc<dyn AlertGateway>,
}

impl AlertStore {
    /// Create a store without durable retry; failed writes roll back
    /// and are reported, nothing is queued.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(gateway: Arc<dyn AlertGateway>) -> Self {
        Self::spawn(gateway, None)
    }

    /// Create a store that queues retryable failed writes in the
    /// given outbox for later replay.
    pub fn with_outbox(gateway: Arc<dyn AlertGateway>, outbox: OutboxRepository) -> Self {
        Self::spawn(gateway, Some(outbox))
    }

    fn spawn(gateway: Arc<dyn AlertGateway>, outbox: Option<OutboxRepository>) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let store_worker = StoreWorker::new(gateway.clone(), outbox);
        tokio::spawn(store_worker.run(rx));
        Self { tx, gateway }
    }

    /// Replace the collection with the gateway's current state.
    ///
    /// The gateway call runs outside the worker mailbox so mutations
    /// are never blocked behind a slow list; a result that arrives
    /// after a newer mutation is discarded. On failure the existing
    /// records are preserved and the error is returned.
    pub async fn refresh(&self) -> Result<Vec<AlertRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::BeginRefresh { reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        let issued_seq = rx.await.map_err(|_| SyncError::StoreClosed)?;

        let outcome = match self.gateway.list().await {
            Ok(body) => Ok(normalize_collection(&body)),
            Err(error) => Err(error),
        };

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::FinishRefresh {
                outcome,
                issued_seq,
                reply,
            })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// Create an alert. Validation failures are raised before any
    /// gateway call; gateway failures leave the store unchanged.
    pub async fn create(&self, draft: AlertDraft) -> Result<AlertRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Create { draft, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// Apply a partial update optimistically; rolls back on failure.
    pub async fn update(&self, id: i64, patch: AlertPatch) -> Result<AlertRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Mutate { id, patch, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// Mark an alert completed (idempotent on already-completed alerts).
    pub async fn resolve(&self, id: i64) -> Result<AlertRecord> {
        self.update(id, AlertPatch::status(AlertStatus::Completed))
            .await
    }

    /// Mark an alert accepted by a responder.
    pub async fn accept(&self, id: i64) -> Result<AlertRecord> {
        self.update(id, AlertPatch::status(AlertStatus::Accepted))
            .await
    }

    /// Cancel a pending or accepted alert.
    pub async fn cancel(&self, id: i64) -> Result<AlertRecord> {
        self.update(id, AlertPatch::status(AlertStatus::Cancelled))
            .await
    }

    /// Remove an alert optimistically. A gateway 404 is success; any
    /// other failure restores the record.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Delete { id, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// Re-fetch a single alert from the gateway and upsert it.
    ///
    /// Stamped like [`refresh`](Self::refresh): a response that arrives
    /// after a newer committed mutation is discarded and the current
    /// record is returned instead, so a slow fetch can never overwrite
    /// a confirmed write or resurrect a deleted alert.
    pub async fn fetch(&self, id: i64) -> Result<AlertRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::BeginFetch { reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        let issued_seq = rx.await.map_err(|_| SyncError::StoreClosed)?;

        let payload = self.gateway.fetch(id).await?;
        let record = normalize_alert(&payload);

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::FinishFetch {
                record,
                issued_seq,
                reply,
            })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// All records, newest first.
    pub async fn alerts(&self) -> Result<Vec<AlertRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Snapshot { reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)
    }

    pub async fn get(&self, id: i64) -> Result<Option<AlertRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Get { id, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Status { reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)
    }

    /// Sync state of one record, if the store is tracking it.
    pub async fn sync_state(&self, id: i64) -> Result<Option<SyncState>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::SyncStateOf { id, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)
    }

    /// Upsert a gateway-confirmed record (outbox replay path).
    pub(crate) async fn absorb(&self, record: AlertRecord) -> Result<AlertRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Absorb { record, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    /// Confirm a replayed delete (outbox replay path).
    pub(crate) async fn absorb_delete(&self, id: i64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::AbsorbDelete { id, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }

    pub(crate) async fn mark_sync(&self, id: i64, state: SyncState) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::MarkSync { id, state, reply })
            .await
            .map_err(|_| SyncError::StoreClosed)?;
        rx.await.map_err(|_| SyncError::StoreClosed)?
    }
}
