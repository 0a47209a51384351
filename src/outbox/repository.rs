//! Outbox persistence layer
//!
//! SQLite-backed journal of failed writes. Uses WAL mode for crash
//! safety and versioned migrations applied at startup.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use super::{OutboxEntry, OutboxKind, OutboxStatus};
use crate::config;
use crate::error::Result;
use crate::model::{AlertDraft, AlertPatch};

/// Repository for outbox entries
#[derive(Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the outbox database at the given path and apply
    /// migrations.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        tracing::info!("Opening outbox database at: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))
                .map_err(sqlx::Error::from)?
                .create_if_missing(true)
                .busy_timeout(std::time::Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        initialize_outbox(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn enqueue_create(&self, draft: &AlertDraft) -> Result<OutboxEntry> {
        self.enqueue(OutboxKind::Create, None, serde_json::to_string(draft)?)
            .await
    }

    pub async fn enqueue_update(&self, alert_id: i64, patch: &AlertPatch) -> Result<OutboxEntry> {
        self.enqueue(
            OutboxKind::Update,
            Some(alert_id),
            serde_json::to_string(patch)?,
        )
        .await
    }

    pub async fn enqueue_delete(&self, alert_id: i64) -> Result<OutboxEntry> {
        self.enqueue(OutboxKind::Delete, Some(alert_id), String::new())
            .await
    }

    async fn enqueue(
        &self,
        kind: OutboxKind,
        alert_id: Option<i64>,
        payload: String,
    ) -> Result<OutboxEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let entry = sqlx::query_as::<_, OutboxEntry>(
            r#"
            INSERT INTO outbox_entries
                (id, kind, alert_id, payload, attempts, next_attempt_at, status, last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, 'pending', NULL, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(kind)
        .bind(alert_id)
        .bind(&payload)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Enqueued outbox entry: {} ({:?})", id, entry.kind);
        Ok(entry)
    }

    /// Pending entries whose backoff has elapsed, oldest first.
    pub async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM outbox_entries
            WHERE status = 'pending' AND next_attempt_at <= ?
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Remove an entry after its write has been confirmed.
    pub async fn mark_replayed(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM outbox_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Outbox entry replayed and removed: {}", id);
        Ok(())
    }

    /// Record a retryable failure: bump attempts and reschedule with
    /// exponential backoff, or mark the entry failed once the attempt
    /// budget is exhausted. Returns the entry's new status.
    pub async fn record_failure(&self, entry: &OutboxEntry, error: &str) -> Result<OutboxStatus> {
        let attempts = entry.attempts + 1;
        let now = Utc::now();

        if attempts >= config::OUTBOX_MAX_ATTEMPTS {
            sqlx::query(
                r#"
                UPDATE outbox_entries
                SET attempts = ?, status = 'failed', last_error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(attempts)
            .bind(error)
            .bind(now)
            .bind(&entry.id)
            .execute(&self.pool)
            .await?;

            tracing::warn!("Outbox entry {} abandoned after {} attempts", entry.id, attempts);
            return Ok(OutboxStatus::Failed);
        }

        let next_attempt_at = now + Duration::seconds(config::outbox_backoff_secs(attempts));
        sqlx::query(
            r#"
            UPDATE outbox_entries
            SET attempts = ?, next_attempt_at = ?, last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .bind(now)
        .bind(&entry.id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Outbox entry {} rescheduled (attempt {}, next at {})",
            entry.id,
            attempts,
            next_attempt_at
        );
        Ok(OutboxStatus::Pending)
    }

    /// Mark an entry permanently failed (the gateway rejected the write).
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_entries
            SET status = 'failed', last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        tracing::warn!("Outbox entry marked failed: {}", id);
        Ok(())
    }

    /// (pending, failed) entry counts.
    pub async fn counts(&self) -> Result<(i64, i64)> {
        let pending: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_entries WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        let failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_entries WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        Ok((pending, failed))
    }
}

/// Initialize the outbox schema, applying any unapplied migrations.
pub async fn initialize_outbox(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i32 = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM migrations")
        .fetch_one(pool)
        .await?
        .get(0);

    for (version, sql) in migrations() {
        if version > current_version {
            tracing::info!("Applying outbox migration version {}", version);

            let mut tx = pool.begin().await?;
            for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO migrations (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
    }

    Ok(())
}

fn migrations() -> Vec<(i32, &'static str)> {
    vec![(1, include_str!("migrations/001_outbox.sql"))]
}
