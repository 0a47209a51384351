//! Alert record normalizer
//!
//! The SafeTNet backend has grown three generations of alert payload
//! shapes. This module coerces all of them into the canonical
//! [`AlertRecord`] with a total, pure mapping: any input — malformed,
//! truncated, or null — produces a valid record with documented
//! defaults, never an error.
//!
//! Each known shape is named explicitly and mapped by its own arm, with
//! an `Unrecognized` fallback, rather than chaining field fallbacks
//! across shapes.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{AlertPriority, AlertRecord, AlertStatus, AlertType};

/// The backend payload shapes this client knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Current API: `id` plus flat `latitude`/`longitude`
    Canonical,
    /// Pre-v2 API: `pk`/`alert_id` plus `location_lat`/`location_long`
    LegacyFlat,
    /// Mobile push payloads: coordinates nested under a `location` object
    NestedLocation,
    /// Anything else; mapped to the all-defaults record
    Unrecognized,
}

/// Classify a raw payload by its structural markers.
pub fn classify(value: &Value) -> PayloadShape {
    let Some(obj) = value.as_object() else {
        return PayloadShape::Unrecognized;
    };
    if obj.get("location").is_some_and(Value::is_object) {
        return PayloadShape::NestedLocation;
    }
    if obj.contains_key("pk") || obj.contains_key("alert_id") || obj.contains_key("location_lat") {
        return PayloadShape::LegacyFlat;
    }
    if obj.contains_key("id") {
        return PayloadShape::Canonical;
    }
    PayloadShape::Unrecognized
}

/// Convert an arbitrary backend payload into a canonical record.
///
/// Defaults for missing or uncoercible fields: `0` for the id and
/// coordinates, empty string for text, `pending` for status, and the
/// current time for timestamps.
pub fn normalize_alert(value: &Value) -> AlertRecord {
    match classify(value) {
        PayloadShape::Canonical => from_canonical(value),
        PayloadShape::LegacyFlat => from_legacy_flat(value),
        PayloadShape::NestedLocation => from_nested_location(value),
        PayloadShape::Unrecognized => {
            tracing::warn!("Unrecognized alert payload shape, using defaults");
            default_record()
        }
    }
}

/// Normalize a list response: either a bare array or a paginated
/// `{results: [...]}` envelope. Unrecognized collection shapes yield an
/// empty list.
pub fn normalize_collection(value: &Value) -> Vec<AlertRecord> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("results").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => {
                tracing::warn!("Unrecognized alert collection shape, treating as empty");
                return Vec::new();
            }
        },
        _ => {
            tracing::warn!("Unrecognized alert collection shape, treating as empty");
            return Vec::new();
        }
    };
    items.iter().map(normalize_alert).collect()
}

fn from_canonical(value: &Value) -> AlertRecord {
    AlertRecord {
        id: coerce_i64(value.get("id")),
        latitude: coerce_f64(value.get("latitude")),
        longitude: coerce_f64(value.get("longitude")),
        address: coerce_string(value.get("address")),
        ..common_fields(value)
    }
}

fn from_legacy_flat(value: &Value) -> AlertRecord {
    // The legacy API used `pk` for list rows and `alert_id` for detail rows
    let id = match value.get("pk") {
        Some(pk) => coerce_i64(Some(pk)),
        None => coerce_i64(value.get("alert_id")),
    };
    AlertRecord {
        id,
        latitude: coerce_f64(value.get("location_lat")),
        longitude: coerce_f64(value.get("location_long")),
        address: coerce_string(value.get("address")),
        ..common_fields(value)
    }
}

fn from_nested_location(value: &Value) -> AlertRecord {
    let location = value.get("location").and_then(Value::as_object);
    let pick = |keys: &[&str]| -> Option<&Value> {
        location.and_then(|loc| keys.iter().find_map(|k| loc.get(*k)))
    };
    let id = match value.get("id") {
        Some(id) => coerce_i64(Some(id)),
        None => coerce_i64(value.get("pk")),
    };
    AlertRecord {
        id,
        latitude: coerce_f64(pick(&["latitude", "lat"])),
        longitude: coerce_f64(pick(&["longitude", "lng", "long"])),
        address: coerce_string(pick(&["address"]).or_else(|| value.get("address"))),
        ..common_fields(value)
    }
}

/// Fields read identically across every known shape.
fn common_fields(value: &Value) -> AlertRecord {
    let message = coerce_string(value.get("message"));
    let description = match value.get("description").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        // The backend omits the description when it equals the message
        _ => message.clone(),
    };
    let status_field = match value.get("status") {
        Some(s) => Some(s),
        None => value.get("alert_status"),
    };
    AlertRecord {
        id: 0,
        alert_type: parse_alert_type(value.get("alert_type")),
        priority: parse_priority(value.get("priority")),
        message,
        description,
        latitude: 0.0,
        longitude: 0.0,
        address: String::new(),
        status: parse_status(status_field),
        created_at: parse_timestamp(value.get("created_at")),
        updated_at: parse_timestamp(value.get("updated_at")),
        created_by_role: value
            .get("created_by_role")
            .and_then(Value::as_str)
            .map(str::to_string),
        geofence_id: match value.get("geofence_id") {
            Some(g) => coerce_opt_i64(Some(g)),
            None => coerce_opt_i64(value.get("geofence")),
        },
    }
}

fn default_record() -> AlertRecord {
    common_fields(&Value::Null)
}

/// Integer, or a numeric string; anything else is 0.
fn coerce_i64(value: Option<&Value>) -> i64 {
    coerce_opt_i64(value).unwrap_or(0)
}

fn coerce_opt_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Float, or a numeric string; anything else is 0.0.
fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn parse_alert_type(value: Option<&Value>) -> AlertType {
    match value.and_then(Value::as_str) {
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "emergency" | "sos" | "panic" => AlertType::Emergency,
            "security" => AlertType::Security,
            _ => AlertType::Normal,
        },
        None => AlertType::Normal,
    }
}

fn parse_priority(value: Option<&Value>) -> AlertPriority {
    match value.and_then(Value::as_str) {
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "high" | "critical" => AlertPriority::High,
            "low" => AlertPriority::Low,
            _ => AlertPriority::Medium,
        },
        None => AlertPriority::Medium,
    }
}

fn parse_status(value: Option<&Value>) -> AlertStatus {
    match value.and_then(Value::as_str) {
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "accepted" | "in_progress" => AlertStatus::Accepted,
            "completed" | "resolved" => AlertStatus::Completed,
            "cancelled" | "canceled" => AlertStatus::Cancelled,
            _ => AlertStatus::Pending,
        },
        None => AlertStatus::Pending,
    }
}

fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_shape() {
        let payload = json!({
            "id": 42,
            "alert_type": "emergency",
            "priority": "high",
            "message": "Help needed",
            "description": "Fell near the gate",
            "latitude": 51.5074,
            "longitude": -0.1278,
            "address": "Trafalgar Square",
            "status": "pending",
            "created_at": "2026-08-01T10:00:00Z",
            "updated_at": "2026-08-01T10:05:00Z",
            "geofence_id": 7
        });

        assert_eq!(classify(&payload), PayloadShape::Canonical);

        let record = normalize_alert(&payload);
        assert_eq!(record.id, 42);
        assert_eq!(record.alert_type, AlertType::Emergency);
        assert_eq!(record.priority, AlertPriority::High);
        assert_eq!(record.message, "Help needed");
        assert_eq!(record.description, "Fell near the gate");
        assert_eq!(record.latitude, 51.5074);
        assert_eq!(record.address, "Trafalgar Square");
        assert_eq!(record.status, AlertStatus::Pending);
        assert_eq!(record.geofence_id, Some(7));
        assert_eq!(record.created_at.to_rfc3339(), "2026-08-01T10:00:00+00:00");
    }

    #[test]
    fn test_legacy_flat_shape() {
        let payload = json!({
            "pk": "17",
            "alert_type": "security",
            "message": "Gate breach",
            "location_lat": "40.7128",
            "location_long": "-74.0060",
            "alert_status": "in_progress"
        });

        assert_eq!(classify(&payload), PayloadShape::LegacyFlat);

        let record = normalize_alert(&payload);
        assert_eq!(record.id, 17);
        assert_eq!(record.alert_type, AlertType::Security);
        assert_eq!(record.latitude, 40.7128);
        assert_eq!(record.longitude, -74.0060);
        assert_eq!(record.status, AlertStatus::Accepted);
        // Missing description falls back to the message
        assert_eq!(record.description, "Gate breach");
    }

    #[test]
    fn test_nested_location_shape() {
        let payload = json!({
            "id": 3,
            "message": "Check-in missed",
            "location": {"lat": 12.9716, "lng": 77.5946, "address": "MG Road"},
            "status": "resolved"
        });

        assert_eq!(classify(&payload), PayloadShape::NestedLocation);

        let record = normalize_alert(&payload);
        assert_eq!(record.id, 3);
        assert_eq!(record.latitude, 12.9716);
        assert_eq!(record.longitude, 77.5946);
        assert_eq!(record.address, "MG Road");
        assert_eq!(record.status, AlertStatus::Completed);
    }

    #[test]
    fn test_totality_over_malformed_input() {
        // None of these may panic or error
        for payload in [
            Value::Null,
            json!([]),
            json!("just a string"),
            json!(123),
            json!({}),
            json!({"id": {"nested": true}, "latitude": [], "status": 9}),
            json!({"id": null, "message": null}),
        ] {
            let record = normalize_alert(&payload);
            assert_eq!(record.status, AlertStatus::Pending);
            assert_eq!(record.message, "");
        }
    }

    #[test]
    fn test_unrecognized_shape_gets_defaults() {
        let payload = json!({"something": "else"});
        assert_eq!(classify(&payload), PayloadShape::Unrecognized);

        let record = normalize_alert(&payload);
        assert_eq!(record.id, 0);
        assert_eq!(record.latitude, 0.0);
        assert!(!record.has_valid_location());
    }

    #[test]
    fn test_collection_bare_array_and_envelope() {
        let bare = json!([{"id": 1, "message": "a"}, {"id": 2, "message": "b"}]);
        assert_eq!(normalize_collection(&bare).len(), 2);

        let envelope = json!({
            "results": [{"id": 1, "message": "a"}],
            "next": null,
            "previous": null,
            "count": 1
        });
        let records = normalize_collection(&envelope);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);

        assert!(normalize_collection(&json!({"data": []})).is_empty());
        assert!(normalize_collection(&Value::Null).is_empty());
    }

    #[test]
    fn test_status_aliases() {
        for (raw, expected) in [
            ("pending", AlertStatus::Pending),
            ("accepted", AlertStatus::Accepted),
            ("in_progress", AlertStatus::Accepted),
            ("completed", AlertStatus::Completed),
            ("resolved", AlertStatus::Completed),
            ("cancelled", AlertStatus::Cancelled),
            ("canceled", AlertStatus::Cancelled),
            ("garbage", AlertStatus::Pending),
        ] {
            let record = normalize_alert(&json!({"id": 1, "status": raw}));
            assert_eq!(record.status, expected, "status alias {raw}");
        }
    }
}
