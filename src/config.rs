//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the sync core.

// ===== Coordinate Validation =====

/// Minimum valid latitude in degrees
pub const MIN_LATITUDE: f64 = -90.0;
/// Maximum valid latitude in degrees
pub const MAX_LATITUDE: f64 = 90.0;
/// Minimum valid longitude in degrees
pub const MIN_LONGITUDE: f64 = -180.0;
/// Maximum valid longitude in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

// ===== Alert Validation =====

/// Maximum length for an alert message.
/// Prevents oversized payloads from reaching the gateway.
pub const MAX_MESSAGE_LENGTH: usize = 1_000;

/// Maximum length for a human-readable address string
pub const MAX_ADDRESS_LENGTH: usize = 500;

// ===== Gateway Transport =====

/// User agent sent on every gateway request
pub const GATEWAY_USER_AGENT: &str = "SafeTNet-Client";

/// Per-request timeout in seconds for gateway calls
pub const GATEWAY_TIMEOUT_SECS: u64 = 15;

/// Maximum number of pagination pages followed when draining a list
/// response. Bounds a gateway that returns a cyclic `next` link.
pub const MAX_LIST_PAGES: usize = 50;

// ===== Outbox Retry Policy =====

/// Base delay in seconds before the first replay of a failed write
pub const OUTBOX_BASE_BACKOFF_SECS: i64 = 30;

/// Upper bound on the exponential backoff delay (1 hour)
pub const OUTBOX_MAX_BACKOFF_SECS: i64 = 3_600;

/// Attempts after which an outbox entry is marked failed and kept for
/// inspection rather than retried
pub const OUTBOX_MAX_ATTEMPTS: i64 = 8;

/// Maximum entries replayed in a single outbox flush
pub const OUTBOX_FLUSH_BATCH: i64 = 50;

// ===== Background Sync =====

/// Default background sync frequency (outbox flush + store refresh)
pub const DEFAULT_SYNC_FREQUENCY: &str = "5m";

/// Compute the outbox backoff delay in seconds for a given attempt count.
/// Exponential doubling from the base, capped at the maximum.
pub fn outbox_backoff_secs(attempts: i64) -> i64 {
    let shift = attempts.clamp(0, 20) as u32;
    OUTBOX_BASE_BACKOFF_SECS
        .saturating_mul(1i64 << shift)
        .min(OUTBOX_MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(outbox_backoff_secs(0), 30);
        assert_eq!(outbox_backoff_secs(1), 60);
        assert_eq!(outbox_backoff_secs(2), 120);
        assert_eq!(outbox_backoff_secs(10), OUTBOX_MAX_BACKOFF_SECS);
        assert_eq!(outbox_backoff_secs(63), OUTBOX_MAX_BACKOFF_SECS);
    }
}
