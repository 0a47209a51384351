//! HTTP implementation of the alert gateway
//!
//! Thin reqwest-based client for the SafeTNet backend. Handles the
//! wire field naming (`location_lat`/`location_long`) and drains
//! DRF-style pagination on list calls; everything else is passed
//! through as raw JSON for the normalizer.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{AlertGateway, DeleteOutcome};
use crate::config;
use crate::error::{Result, SyncError};
use crate::model::{AlertDraft, AlertPatch};

/// HTTP client for the remote alert gateway
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway client for the given alerts endpoint,
    /// e.g. `https://api.safetnet.example/api/alerts`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config::GATEWAY_USER_AGENT)
            .timeout(Duration::from_secs(config::GATEWAY_TIMEOUT_SECS))
            .build()
            .map_err(|e| SyncError::GatewayUnavailable(format!("Failed to build client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn alert_url(&self, id: i64) -> String {
        format!("{}/{}/", self.base_url, id)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::GatewayRejected {
                status: status.as_u16(),
                message,
            });
        }
        response.json().await.map_err(|e| SyncError::GatewayRejected {
            status: status.as_u16(),
            message: format!("Malformed JSON body: {e}"),
        })
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    SyncError::GatewayUnavailable(e.to_string())
}

/// Map an update patch onto the backend's wire field names.
fn patch_body(patch: &AlertPatch) -> Value {
    let mut body = Map::new();
    if let Some(alert_type) = patch.alert_type {
        body.insert("alert_type".into(), json!(alert_type));
    }
    if let Some(priority) = patch.priority {
        body.insert("priority".into(), json!(priority));
    }
    if let Some(message) = &patch.message {
        body.insert("message".into(), json!(message));
    }
    if let Some(description) = &patch.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(latitude) = patch.latitude {
        body.insert("location_lat".into(), json!(latitude));
    }
    if let Some(longitude) = patch.longitude {
        body.insert("location_long".into(), json!(longitude));
    }
    if let Some(address) = &patch.address {
        body.insert("address".into(), json!(address));
    }
    if let Some(status) = patch.status {
        body.insert("status".into(), json!(status));
    }
    if let Some(geofence_id) = patch.geofence_id {
        body.insert("geofence".into(), json!(geofence_id));
    }
    Value::Object(body)
}

#[async_trait]
impl AlertGateway for HttpGateway {
    async fn list(&self) -> Result<Value> {
        let mut url = format!("{}/", self.base_url);
        let mut items: Vec<Value> = Vec::new();

        for page in 0..config::MAX_LIST_PAGES {
            tracing::debug!("Fetching alert page {} from {}", page, url);

            let response = self.client.get(&url).send().await.map_err(transport_error)?;
            let body = Self::read_json(response).await?;

            match body {
                // Unpaginated backends return the whole collection at once
                Value::Array(mut page_items) => {
                    items.append(&mut page_items);
                    return Ok(Value::Array(items));
                }
                Value::Object(mut obj) => {
                    if let Some(Value::Array(mut page_items)) = obj.remove("results") {
                        items.append(&mut page_items);
                    }
                    match obj.get("next").and_then(Value::as_str) {
                        Some(next) => url = next.to_string(),
                        None => return Ok(Value::Array(items)),
                    }
                }
                other => {
                    tracing::warn!("Unexpected list response shape: {}", other);
                    return Ok(Value::Array(items));
                }
            }
        }

        tracing::warn!(
            "Stopped draining pagination after {} pages",
            config::MAX_LIST_PAGES
        );
        Ok(Value::Array(items))
    }

    async fn fetch(&self, id: i64) -> Result<Value> {
        let response = self
            .client
            .get(self.alert_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response).await
    }

    async fn create(&self, draft: &AlertDraft) -> Result<Value> {
        let body = json!({
            "alert_type": draft.alert_type,
            "priority": draft.priority,
            "message": draft.message,
            "description": draft.description.as_deref().unwrap_or(&draft.message),
            "location_lat": draft.latitude,
            "location_long": draft.longitude,
            "address": draft.address,
            "geofence": draft.geofence_id,
        });

        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response).await
    }

    async fn update(&self, id: i64, patch: &AlertPatch) -> Result<Value> {
        let response = self
            .client
            .patch(self.alert_url(id))
            .json(&patch_body(patch))
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response).await
    }

    async fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        let response = self
            .client
            .delete(self.alert_url(id))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeleteOutcome::Deleted);
        }
        if status.as_u16() == 404 {
            tracing::debug!("Delete of alert {} returned 404, already gone", id);
            return Ok(DeleteOutcome::AlreadyGone);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::GatewayRejected {
            status: status.as_u16(),
            message,
        })
    }
}
