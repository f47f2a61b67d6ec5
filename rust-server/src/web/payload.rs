//! Webhook payload validation.
//!
//! Structural parse first (required fields, types), then semantic checks
//! (E.164 addresses, strict timestamp format). No defaulting or coercion:
//! every field must arrive in the exact required shape.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// E.164 as a lightweight pattern: `+` followed by one or more digits.
static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+\d+$").expect("static regex"));

/// The only accepted timestamp shape: UTC, whole seconds, literal `Z`.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const MAX_TEXT_CHARS: usize = 4096;

/// Why a payload was rejected. The boundary surfaces all variants as a
/// single 422; the detail is for logs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message_id must be non-empty")]
    EmptyMessageId,

    #[error("{field} must be E.164 (`+` followed by digits)")]
    InvalidMsisdn { field: &'static str },

    #[error("ts must match YYYY-MM-DDTHH:MM:SSZ")]
    InvalidTimestamp,

    #[error("text exceeds 4096 characters")]
    TextTooLong,
}

/// An inbound message that passed structural and semantic validation.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub ts: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Parse and validate a raw webhook body.
///
/// Only reachable after signature verification succeeds.
pub fn parse_webhook_payload(body: &[u8]) -> Result<WebhookMessage, ValidationError> {
    let message: WebhookMessage = serde_json::from_slice(body)?;

    if message.message_id.is_empty() {
        return Err(ValidationError::EmptyMessageId);
    }

    if !E164.is_match(&message.from) {
        return Err(ValidationError::InvalidMsisdn { field: "from" });
    }
    if !E164.is_match(&message.to) {
        return Err(ValidationError::InvalidMsisdn { field: "to" });
    }

    if NaiveDateTime::parse_from_str(&message.ts, TS_FORMAT).is_err() {
        return Err(ValidationError::InvalidTimestamp);
    }

    if let Some(text) = &message.text {
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(ValidationError::TextTooLong);
        }
    }

    Ok(message)
}
