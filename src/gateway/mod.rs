//! Remote alert gateway
//!
//! The gateway is the store's only external boundary: the backend
//! HTTP/JSON API for listing and mutating alerts. It is treated as a
//! black box returning raw JSON payloads; shape reconciliation belongs
//! to the normalizer, not to the transport.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{AlertDraft, AlertPatch};

pub use http::HttpGateway;

/// Result of a delete call.
///
/// A 404 from the gateway means the resource is already gone, which is
/// the desired end state, so it is reported as success rather than as
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Client for the remote alert gateway.
///
/// Implementations return raw payloads; callers run them through the
/// normalizer. Transport failures surface as `GatewayUnavailable`,
/// non-2xx responses as `GatewayRejected`.
#[async_trait]
pub trait AlertGateway: Send + Sync {
    /// Fetch the full alert collection, draining any pagination.
    /// Returns a single JSON collection (bare array or envelope).
    async fn list(&self) -> Result<Value>;

    /// Fetch a single alert by id.
    async fn fetch(&self, id: i64) -> Result<Value>;

    /// Create an alert; returns the created payload.
    async fn create(&self, draft: &AlertDraft) -> Result<Value>;

    /// Partially update an alert; returns the updated payload.
    async fn update(&self, id: i64, patch: &AlertPatch) -> Result<Value>;

    /// Delete an alert. A 404 maps to `AlreadyGone`, not an error.
    async fn delete(&self, id: i64) -> Result<DeleteOutcome>;
}
