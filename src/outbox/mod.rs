//! Durable outbox for failed writes
//!
//! When the gateway is unreachable, a rolled-back mutation is not
//! silently dropped: it is journaled here and replayed later with
//! exponential backoff. Replayed creates and updates feed the
//! gateway-confirmed record back into the store; replayed deletes
//! confirm removal. A gateway rejection is permanent and abandons the
//! entry.

pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config;
use crate::error::{Result, SyncError};
use crate::gateway::{AlertGateway, DeleteOutcome};
use crate::model::{AlertDraft, AlertPatch, SyncState};
use crate::normalize::normalize_alert;
use crate::store::AlertStore;

pub use repository::{initialize_outbox, OutboxRepository};

/// The write a journaled entry will replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxKind {
    Create,
    Update,
    Delete,
}

/// Journal state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting for its next replay attempt
    Pending,
    /// Abandoned; kept for inspection
    Failed,
}

/// A journaled write awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub kind: OutboxKind,
    /// Target alert for update/delete; creates have no server id yet
    pub alert_id: Option<i64>,
    /// JSON-encoded draft or patch
    pub payload: String,
    pub attempts: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of one outbox flush pass
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlushSummary {
    /// Entries confirmed by the gateway and removed
    pub replayed: usize,
    /// Entries rescheduled with backoff
    pub rescheduled: usize,
    /// Entries abandoned (rejected or exhausted)
    pub abandoned: usize,
}

/// Replays journaled writes against the gateway
pub struct OutboxService {
    repo: OutboxRepository,
    gateway: Arc<dyn AlertGateway>,
}

impl OutboxService {
    pub fn new(repo: OutboxRepository, gateway: Arc<dyn AlertGateway>) -> Self {
        Self { repo, gateway }
    }

    pub fn repository(&self) -> &OutboxRepository {
        &self.repo
    }

    /// Replay all due entries in enqueue order. Stops early when the
    /// gateway is still unreachable; there is no point burning the
    /// attempt budget of every entry on one outage.
    pub async fn flush(&self, store: &AlertStore) -> Result<FlushSummary> {
        let due = self
            .repo
            .list_due(Utc::now(), config::OUTBOX_FLUSH_BATCH)
            .await?;

        if due.is_empty() {
            return Ok(FlushSummary::default());
        }

        tracing::info!("Flushing {} due outbox entries", due.len());
        let mut summary = FlushSummary::default();

        for entry in due {
            match self.replay(&entry, store).await {
                Ok(()) => {
                    self.repo.mark_replayed(&entry.id).await?;
                    // Replayed deletes have no record left to mark
                    if entry.kind == OutboxKind::Update {
                        if let Some(alert_id) = entry.alert_id {
                            store.mark_sync(alert_id, SyncState::Synced).await?;
                        }
                    }
                    summary.replayed += 1;
                }
                Err(error) if error.is_retryable() => {
                    match self.repo.record_failure(&entry, &error.to_string()).await? {
                        OutboxStatus::Pending => summary.rescheduled += 1,
                        OutboxStatus::Failed => {
                            if let Some(alert_id) = entry.alert_id {
                                store.mark_sync(alert_id, SyncState::Failed).await?;
                            }
                            summary.abandoned += 1;
                        }
                    }
                    tracing::warn!("Gateway still unavailable, stopping outbox flush");
                    break;
                }
                Err(error) => {
                    // The gateway saw the write and said no; retrying
                    // the same payload will not change its mind.
                    self.repo.mark_failed(&entry.id, &error.to_string()).await?;
                    if let Some(alert_id) = entry.alert_id {
                        store.mark_sync(alert_id, SyncState::Failed).await?;
                    }
                    summary.abandoned += 1;
                }
            }
        }

        tracing::info!(
            "Outbox flush done: {} replayed, {} rescheduled, {} abandoned",
            summary.replayed,
            summary.rescheduled,
            summary.abandoned
        );
        Ok(summary)
    }

    async fn replay(&self, entry: &OutboxEntry, store: &AlertStore) -> Result<()> {
        match entry.kind {
            OutboxKind::Create => {
                let draft: AlertDraft = serde_json::from_str(&entry.payload)?;
                let payload = self.gateway.create(&draft).await?;
                let record = normalize_alert(&payload);
                tracing::info!("Replayed queued create as alert {}", record.id);
                store.absorb(record).await?;
            }
            OutboxKind::Update => {
                let alert_id = entry
                    .alert_id
                    .ok_or_else(|| SyncError::ValidationFailed("Update entry without alert id".to_string()))?;
                let patch: AlertPatch = serde_json::from_str(&entry.payload)?;
                let payload = self.gateway.update(alert_id, &patch).await?;
                store.absorb(normalize_alert(&payload)).await?;
            }
            OutboxKind::Delete => {
                let alert_id = entry
                    .alert_id
                    .ok_or_else(|| SyncError::ValidationFailed("Delete entry without alert id".to_string()))?;
                // AlreadyGone is as good as Deleted here
                let _: DeleteOutcome = self.gateway.delete(alert_id).await?;
                store.absorb_delete(alert_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{MockFailure, MockGateway};
    use crate::model::{AlertPriority, AlertStatus, AlertType};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> OutboxRepository {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_outbox(&pool).await.unwrap();
        OutboxRepository::new(pool)
    }

    fn draft(message: &str) -> AlertDraft {
        AlertDraft {
            alert_type: AlertType::Emergency,
            priority: AlertPriority::High,
            message: message.to_string(),
            description: None,
            latitude: 51.5,
            longitude: -0.12,
            address: None,
            geofence_id: None,
        }
    }

    #[tokio::test]
    async fn test_failed_create_is_queued_and_replayed() {
        let gateway = MockGateway::new();
        let repo = test_repo().await;
        let store = AlertStore::with_outbox(gateway.clone(), repo.clone());
        let outbox = OutboxService::new(repo.clone(), gateway.clone());

        // Gateway down: the create fails, no placeholder in the store,
        // but the draft lands in the outbox
        gateway.set_failure(Some(MockFailure::Unavailable));
        assert!(store.create(draft("offline SOS")).await.is_err());
        assert!(store.alerts().await.unwrap().is_empty());
        assert_eq!(repo.counts().await.unwrap(), (1, 0));

        // Gateway back up: flush replays the create into the store
        gateway.set_failure(None);
        let summary = outbox.flush(&store).await.unwrap();
        assert_eq!(summary.replayed, 1);
        assert_eq!(repo.counts().await.unwrap(), (0, 0));

        let alerts = store.alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "offline SOS");
        assert_eq!(alerts[0].status, AlertStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_update_marks_pending_retry_then_synced() {
        let gateway = MockGateway::new();
        let repo = test_repo().await;
        let store = AlertStore::with_outbox(gateway.clone(), repo.clone());
        let outbox = OutboxService::new(repo.clone(), gateway.clone());

        gateway.seed(vec![serde_json::json!({
            "id": 1, "message": "a", "status": "pending",
            "latitude": 1.0, "longitude": 2.0,
            "created_at": "2026-08-01T10:00:00Z",
            "updated_at": "2026-08-01T10:00:00Z",
        })]);
        store.refresh().await.unwrap();

        gateway.set_failure(Some(MockFailure::Unavailable));
        assert!(store.resolve(1).await.is_err());
        assert_eq!(
            store.sync_state(1).await.unwrap(),
            Some(SyncState::PendingRetry)
        );
        // Rolled back locally
        assert_eq!(
            store.get(1).await.unwrap().unwrap().status,
            AlertStatus::Pending
        );

        gateway.set_failure(None);
        let summary = outbox.flush(&store).await.unwrap();
        assert_eq!(summary.replayed, 1);

        assert_eq!(store.sync_state(1).await.unwrap(), Some(SyncState::Synced));
        assert_eq!(
            store.get(1).await.unwrap().unwrap().status,
            AlertStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_flush_stops_early_while_gateway_down() {
        let gateway = MockGateway::new();
        let repo = test_repo().await;
        let store = AlertStore::with_outbox(gateway.clone(), repo.clone());
        let outbox = OutboxService::new(repo.clone(), gateway.clone());

        repo.enqueue_delete(1).await.unwrap();
        repo.enqueue_delete(2).await.unwrap();

        gateway.set_failure(Some(MockFailure::Unavailable));
        let summary = outbox.flush(&store).await.unwrap();

        // Only the first entry burned an attempt; the second waits
        assert_eq!(summary.rescheduled, 1);
        assert_eq!(summary.replayed, 0);
        assert_eq!(repo.counts().await.unwrap(), (2, 0));
    }

    #[tokio::test]
    async fn test_rejected_replay_is_abandoned() {
        let gateway = MockGateway::new();
        let repo = test_repo().await;
        let store = AlertStore::with_outbox(gateway.clone(), repo.clone());
        let outbox = OutboxService::new(repo.clone(), gateway.clone());

        repo.enqueue_update(9, &AlertPatch::status(AlertStatus::Completed))
            .await
            .unwrap();

        gateway.set_failure(Some(MockFailure::Rejected(422)));
        let summary = outbox.flush(&store).await.unwrap();

        assert_eq!(summary.abandoned, 1);
        assert_eq!(repo.counts().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_replayed_delete_confirms_removal() {
        let gateway = MockGateway::new();
        let repo = test_repo().await;
        let store = AlertStore::with_outbox(gateway.clone(), repo.clone());
        let outbox = OutboxService::new(repo.clone(), gateway.clone());

        // Nothing on the server: replay hits the 404 path, still success
        repo.enqueue_delete(5).await.unwrap();
        let summary = outbox.flush(&store).await.unwrap();

        assert_eq!(summary.replayed, 1);
        assert_eq!(repo.counts().await.unwrap(), (0, 0));
    }
}
