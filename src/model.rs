//! Canonical alert data model
//!
//! Rust structs representing the client-side view of alert records.
//! All models use serde for serialization to the UI layer; wire-format
//! concerns (backend field naming) live in the normalizer and gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{Result, SyncError};

/// Category of a reported safety event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Emergency,
    Security,
    #[default]
    Normal,
}

/// Dispatch priority assigned to an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// Lifecycle status of an alert.
///
/// Local optimistic transitions follow the progression
/// pending → accepted → completed (completed is reachable directly from
/// pending), with cancelled reachable from pending or accepted. A status
/// returned by the gateway is authoritative and overwrites any local guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl AlertStatus {
    /// Whether a locally requested transition to `next` is allowed.
    /// Completed and cancelled are terminal.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Completed)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AlertStatus::Completed | AlertStatus::Cancelled)
    }
}

/// An alert record in canonical shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Server-assigned identity; unique, never reused
    pub id: i64,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    /// Defaults to `message` when the backend omits it
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Human-readable location, derived or provided
    pub address: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by_role: Option<String>,
    /// Reference to an administrator-drawn geofence; containment is
    /// evaluated by the backend, never by this client.
    pub geofence_id: Option<i64>,
}

impl AlertRecord {
    /// Whether the record carries a usable GPS fix: coordinates within
    /// bounds and not the (0, 0) "no fix" sentinel.
    pub fn has_valid_location(&self) -> bool {
        coordinates_valid(self.latitude, self.longitude)
    }
}

/// Input for creating a new alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDraft {
    #[serde(default)]
    pub alert_type: AlertType,
    #[serde(default)]
    pub priority: AlertPriority,
    pub message: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub geofence_id: Option<i64>,
}

impl AlertDraft {
    /// Validate local preconditions before any gateway call is made.
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(SyncError::ValidationFailed(
                "Alert message must not be empty".to_string(),
            ));
        }
        if self.message.len() > config::MAX_MESSAGE_LENGTH {
            return Err(SyncError::ValidationFailed(format!(
                "Alert message exceeds {} characters",
                config::MAX_MESSAGE_LENGTH
            )));
        }
        if let Some(address) = &self.address {
            if address.len() > config::MAX_ADDRESS_LENGTH {
                return Err(SyncError::ValidationFailed(format!(
                    "Address exceeds {} characters",
                    config::MAX_ADDRESS_LENGTH
                )));
            }
        }
        validate_coordinates(self.latitude, self.longitude)
    }
}

/// Partial update applied to an existing alert.
/// Absent fields are left untouched on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<AlertType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<AlertPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence_id: Option<i64>,
}

impl AlertPatch {
    /// Shorthand for a pure status transition patch
    pub fn status(status: AlertStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Validate the patch fields that carry local preconditions.
    /// Coordinates may only be patched as a pair.
    pub fn validate(&self) -> Result<()> {
        if let Some(message) = &self.message {
            if message.trim().is_empty() {
                return Err(SyncError::ValidationFailed(
                    "Alert message must not be empty".to_string(),
                ));
            }
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => validate_coordinates(lat, lng)?,
            (None, None) => {}
            _ => {
                return Err(SyncError::ValidationFailed(
                    "Latitude and longitude must be updated together".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply this patch to a record in place (the optimistic local write).
    pub fn apply_to(&self, record: &mut AlertRecord) {
        if let Some(alert_type) = self.alert_type {
            record.alert_type = alert_type;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(message) = &self.message {
            record.message = message.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(latitude) = self.latitude {
            record.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            record.longitude = longitude;
        }
        if let Some(address) = &self.address {
            record.address = address.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(geofence_id) = self.geofence_id {
            record.geofence_id = Some(geofence_id);
        }
        record.updated_at = Utc::now();
    }
}

/// Synchronization state of one record with respect to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    /// The gateway has confirmed the last write for this record
    #[default]
    Synced,
    /// A failed write is queued in the outbox awaiting replay
    PendingRetry,
    /// The outbox gave up on a write for this record
    Failed,
}

fn coordinates_valid(latitude: f64, longitude: f64) -> bool {
    if !latitude.is_finite() || !longitude.is_finite() {
        return false;
    }
    if !(config::MIN_LATITUDE..=config::MAX_LATITUDE).contains(&latitude) {
        return false;
    }
    if !(config::MIN_LONGITUDE..=config::MAX_LONGITUDE).contains(&longitude) {
        return false;
    }
    // (0, 0) means "no GPS fix" in every SafeTNet client
    !(latitude == 0.0 && longitude == 0.0)
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !coordinates_valid(latitude, longitude) {
        return Err(SyncError::ValidationFailed(format!(
            "Invalid GPS coordinates: ({latitude}, {longitude})"
        )));
    }
    Ok(())
}
