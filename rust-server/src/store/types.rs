//! Row and result types for the message store.

use serde::Serialize;

/// Outcome of an insert attempt.
///
/// A duplicate `message_id` is a successful no-op, distinguished from
/// `Created` only for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    Duplicate,
}

impl InsertOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertOutcome::Created => "created",
            InsertOutcome::Duplicate => "duplicate",
        }
    }
}

/// A persisted message as returned by the listing query.
///
/// Serializes to the wire shape `{message_id, from, to, ts, text}`;
/// `created_at` is server-internal and never leaves the store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub message_id: String,
    #[sqlx(rename = "from_msisdn")]
    pub from: String,
    #[sqlx(rename = "to_msisdn")]
    pub to: String,
    pub ts: String,
    pub text: Option<String>,
}

/// Optional listing filters, conjunctive when present.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact match on the sender.
    pub from: Option<String>,
    /// Inclusive lower bound on `ts`, compared as the literal string.
    pub since: Option<String>,
    /// Case-insensitive substring match on `text`. Null text never matches.
    pub q: Option<String>,
}

/// One page of the filtered listing plus the pre-pagination match count.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub data: Vec<StoredMessage>,
    pub total: i64,
}

/// Per-sender message count for the stats summary.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SenderCount {
    #[sqlx(rename = "from_msisdn")]
    pub from: String,
    pub count: i64,
}

/// Corpus-wide summary statistics.
///
/// `first_message_ts`/`last_message_ts` are null on an empty store.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_messages: i64,
    pub senders_count: i64,
    pub messages_per_sender: Vec<SenderCount>,
    pub first_message_ts: Option<String>,
    pub last_message_ts: Option<String>,
}
