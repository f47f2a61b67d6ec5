//! MsgVault - webhook message ingestion, query, and stats service.
//!
//! Inbound webhook calls pass through three stages in order, short-circuiting
//! on the first failure:
//!
//! ```text
//! raw body → signature verification → payload validation → idempotent insert
//! ```
//!
//! Two independent read paths serve the stored corpus: a filtered, paginated
//! listing with deterministic ordering, and corpus-wide summary statistics.

pub mod config;
pub mod metrics;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use metrics::{Metrics, WebhookResult};
pub use store::{
    InsertOutcome, ListFilter, MessagePage, SenderCount, StatsSummary, Store, StoreError,
    StoredMessage,
};
pub use web::{AppState, ValidationError, WebhookMessage};
