/// Sync Scheduler
/// Runs the periodic background sync (outbox flush followed by a store
/// refresh) on a cron schedule.
use crate::error::{Result, SyncError};
use crate::outbox::OutboxService;
use crate::store::AlertStore;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Background sync frequency options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFrequency {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl SyncFrequency {
    /// Convert frequency to cron expression
    fn to_cron(self) -> String {
        match self {
            SyncFrequency::Minutes(m) => {
                if m == 1 {
                    "0 * * * * *".to_string() // Every minute
                } else {
                    format!("0 */{} * * * *", m) // Every N minutes
                }
            }
            SyncFrequency::Hours(h) => {
                if h == 1 {
                    "0 0 * * * *".to_string() // Every hour
                } else {
                    format!("0 0 */{} * * *", h) // Every N hours
                }
            }
            SyncFrequency::Days(d) => {
                if d == 1 {
                    "0 0 6 * * *".to_string() // Daily at 6 AM
                } else {
                    format!("0 0 6 */{} * *", d) // Every N days at 6 AM
                }
            }
        }
    }
}

impl FromStr for SyncFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Support formats: "5m", "2h", "3d" or legacy "hourly", "daily"
        let s = s.trim().to_lowercase();

        // Legacy format support
        match s.as_str() {
            "hourly" => return Ok(SyncFrequency::Hours(1)),
            "daily" => return Ok(SyncFrequency::Days(1)),
            _ => {}
        }

        // New format: <number><unit>; split on a char boundary so a
        // multibyte trailing character is an error, not a panic
        let mut chars = s.chars();
        let unit = chars
            .next_back()
            .ok_or_else(|| "Empty frequency string".to_string())?;
        let number_part = chars.as_str();

        let value: u32 = number_part
            .parse()
            .map_err(|_| format!("Invalid number in frequency: {}", s))?;

        if value == 0 {
            return Err("Frequency value must be greater than 0".to_string());
        }

        match unit {
            'm' => Ok(SyncFrequency::Minutes(value)),
            'h' => Ok(SyncFrequency::Hours(value)),
            'd' => Ok(SyncFrequency::Days(value)),
            _ => Err(format!(
                "Invalid frequency unit '{}'. Use 'm' (minutes), 'h' (hours), or 'd' (days)",
                unit
            )),
        }
    }
}

/// Scheduler service for background sync
pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    store: AlertStore,
    outbox: Arc<OutboxService>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
}

impl SyncScheduler {
    /// Create new sync scheduler
    pub async fn new(store: AlertStore, outbox: OutboxService) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SyncError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            store,
            outbox: Arc::new(outbox),
            current_job_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| SyncError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Background sync scheduler started");
        Ok(())
    }

    /// Schedule background sync, replacing any existing schedule
    pub async fn schedule_sync(&self, frequency: SyncFrequency, enabled: bool) -> Result<()> {
        // Remove existing job if any
        self.cancel_sync().await?;

        if !enabled {
            tracing::info!("Background sync disabled");
            return Ok(());
        }

        let cron_expr = frequency.to_cron();
        let store = self.store.clone();
        let outbox = Arc::clone(&self.outbox);

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let store = store.clone();
            let outbox = Arc::clone(&outbox);
            Box::pin(async move {
                tracing::info!("Running scheduled background sync");

                // Replay queued writes first so the refresh sees them
                match outbox.flush(&store).await {
                    Ok(summary) => {
                        if summary.replayed > 0 || summary.abandoned > 0 {
                            tracing::info!(
                                "Outbox flush: {} replayed, {} abandoned",
                                summary.replayed,
                                summary.abandoned
                            );
                        }
                    }
                    Err(e) => tracing::error!("Scheduled outbox flush failed: {}", e),
                }

                match store.refresh().await {
                    Ok(alerts) => tracing::debug!("Refreshed {} alerts", alerts.len()),
                    Err(e) => tracing::warn!("Scheduled refresh failed: {}", e),
                }
            })
        })
        .map_err(|e| SyncError::Scheduler(format!("Failed to create sync job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| SyncError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        let mut current_job = self.current_job_id.write().await;
        *current_job = Some(job_id);

        tracing::info!("Background sync scheduled: {:?} ({})", frequency, cron_expr);
        Ok(())
    }

    /// Cancel scheduled sync
    pub async fn cancel_sync(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = *current_job {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| SyncError::Scheduler(format!("Failed to remove job: {}", e)))?;

            *current_job = None;
            tracing::info!("Background sync schedule cancelled");
        }

        Ok(())
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| SyncError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Background sync scheduler shutdown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_from_str() {
        assert_eq!("5m".parse(), Ok(SyncFrequency::Minutes(5)));
        assert_eq!("2h".parse(), Ok(SyncFrequency::Hours(2)));
        assert_eq!("3d".parse(), Ok(SyncFrequency::Days(3)));
        assert_eq!("hourly".parse(), Ok(SyncFrequency::Hours(1)));
        assert_eq!("daily".parse(), Ok(SyncFrequency::Days(1)));
        assert_eq!(" 10M ".parse(), Ok(SyncFrequency::Minutes(10)));
    }

    #[test]
    fn test_frequency_from_str_rejects_garbage() {
        assert!("".parse::<SyncFrequency>().is_err());
        assert!("0m".parse::<SyncFrequency>().is_err());
        assert!("5x".parse::<SyncFrequency>().is_err());
        assert!("weekly-ish".parse::<SyncFrequency>().is_err());
        // Multibyte unit must be rejected, not panic on a byte slice
        assert!("5µ".parse::<SyncFrequency>().is_err());
        assert!("µ".parse::<SyncFrequency>().is_err());
    }

    #[test]
    fn test_frequency_to_cron() {
        assert_eq!(SyncFrequency::Minutes(1).to_cron(), "0 * * * * *");
        assert_eq!(SyncFrequency::Minutes(15).to_cron(), "0 */15 * * * *");
        assert_eq!(SyncFrequency::Hours(1).to_cron(), "0 0 * * * *");
        assert_eq!(SyncFrequency::Days(1).to_cron(), "0 0 6 * * *");
    }
}
