//! In-memory gateway double for unit tests
//!
//! Behaves like a small canonical-shape backend: assigns ids, applies
//! patches, and can be switched into failure modes or gated so a list
//! call blocks until the test releases it.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{AlertGateway, DeleteOutcome};
use crate::error::{Result, SyncError};
use crate::model::{AlertDraft, AlertPatch};

#[derive(Debug, Clone, Copy)]
pub(crate) enum MockFailure {
    Unavailable,
    Rejected(u16),
}

#[derive(Default)]
pub(crate) struct CallCounts {
    pub list: AtomicUsize,
    pub fetch: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
}

pub(crate) struct MockGateway {
    alerts: Mutex<Vec<Value>>,
    failure: Mutex<Option<MockFailure>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    pub calls: CallCounts,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            list_gate: Mutex::new(None),
            fetch_gate: Mutex::new(None),
            calls: CallCounts::default(),
        })
    }

    pub fn seed(&self, alerts: Vec<Value>) {
        *self.alerts.lock().unwrap() = alerts;
    }

    pub fn set_failure(&self, failure: Option<MockFailure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Make the next list call block until the returned handle is notified.
    pub fn gate_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make the next fetch call block until the returned handle is notified.
    pub fn gate_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock().unwrap() {
            Some(MockFailure::Unavailable) => {
                Err(SyncError::GatewayUnavailable("connection refused".to_string()))
            }
            Some(MockFailure::Rejected(status)) => Err(SyncError::GatewayRejected {
                status,
                message: "rejected by test".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn next_id(alerts: &[Value]) -> i64 {
        alerts
            .iter()
            .filter_map(|a| a.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn position(alerts: &[Value], id: i64) -> Option<usize> {
        alerts
            .iter()
            .position(|a| a.get("id").and_then(Value::as_i64) == Some(id))
    }
}

#[async_trait]
impl AlertGateway for MockGateway {
    async fn list(&self) -> Result<Value> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);

        // Snapshot first so a gated call models a slow in-flight
        // response carrying the server state at request time.
        let outcome = self
            .check_failure()
            .map(|_| Value::Array(self.alerts.lock().unwrap().clone()));

        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        outcome
    }

    async fn fetch(&self, id: i64) -> Result<Value> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);

        // Snapshot first, as in list: a gated call models a slow
        // in-flight response carrying the state at request time.
        let outcome = self.check_failure().and_then(|_| {
            let alerts = self.alerts.lock().unwrap();
            Self::position(&alerts, id)
                .map(|i| alerts[i].clone())
                .ok_or(SyncError::GatewayRejected {
                    status: 404,
                    message: "not found".to_string(),
                })
        });

        let gate = self.fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        outcome
    }

    async fn create(&self, draft: &AlertDraft) -> Result<Value> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut alerts = self.alerts.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let payload = json!({
            "id": Self::next_id(&alerts),
            "alert_type": draft.alert_type,
            "priority": draft.priority,
            "message": draft.message,
            "description": draft.description.as_deref().unwrap_or(&draft.message),
            "latitude": draft.latitude,
            "longitude": draft.longitude,
            "address": draft.address.as_deref().unwrap_or(""),
            "status": "pending",
            "created_at": now,
            "updated_at": now,
        });
        alerts.push(payload.clone());
        Ok(payload)
    }

    async fn update(&self, id: i64, patch: &AlertPatch) -> Result<Value> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut alerts = self.alerts.lock().unwrap();
        let Some(index) = Self::position(&alerts, id) else {
            return Err(SyncError::GatewayRejected {
                status: 404,
                message: "not found".to_string(),
            });
        };

        // AlertPatch serializes with canonical field names, which is
        // exactly the shape this mock stores.
        let changes = serde_json::to_value(patch)?;
        if let (Some(target), Some(changes)) = (alerts[index].as_object_mut(), changes.as_object())
        {
            for (key, value) in changes {
                target.insert(key.clone(), value.clone());
            }
            target.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        Ok(alerts[index].clone())
    }

    async fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut alerts = self.alerts.lock().unwrap();
        match Self::position(&alerts, id) {
            Some(index) => {
                alerts.remove(index);
                Ok(DeleteOutcome::Deleted)
            }
            None => Ok(DeleteOutcome::AlreadyGone),
        }
    }
}
