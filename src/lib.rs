//! SafeTNet sync core
//!
//! Client-side synchronization engine shared by the SafeTNet
//! applications: an optimistic in-memory store of alert records kept
//! consistent with the remote alert gateway, a normalizer reconciling
//! the backend's payload shapes, a durable outbox replaying writes
//! that failed while offline, and a background sync scheduler.

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod normalize;
pub mod outbox;
pub mod scheduler;
pub mod store;

pub use error::{Result, SyncError};
pub use gateway::{AlertGateway, HttpGateway};
pub use model::{AlertDraft, AlertPatch, AlertRecord, AlertStatus, SyncState};
pub use outbox::{OutboxRepository, OutboxService};
pub use scheduler::{SyncFrequency, SyncScheduler};
pub use store::{AlertStore, StoreStatus};
