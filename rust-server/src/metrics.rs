//! In-process request counters with a Prometheus-style text rendering.
//!
//! Counters live in an injected [`Metrics`] registry held by the application
//! state rather than in module-level statics, so handlers stay independently
//! testable and the process carries no hidden shared state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Result tag recorded for every webhook outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    InvalidSignature,
    ValidationError,
    Created,
    Duplicate,
}

impl WebhookResult {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookResult::InvalidSignature => "invalid_signature",
            WebhookResult::ValidationError => "validation_error",
            WebhookResult::Created => "created",
            WebhookResult::Duplicate => "duplicate",
        }
    }

    fn index(self) -> usize {
        match self {
            WebhookResult::InvalidSignature => 0,
            WebhookResult::ValidationError => 1,
            WebhookResult::Created => 2,
            WebhookResult::Duplicate => 3,
        }
    }
}

const WEBHOOK_RESULTS: [WebhookResult; 4] = [
    WebhookResult::InvalidSignature,
    WebhookResult::ValidationError,
    WebhookResult::Created,
    WebhookResult::Duplicate,
];

/// Latency bucket upper bounds in milliseconds. Each observation lands in
/// exactly one bucket; a fourth slot catches everything above the last bound.
const LATENCY_BUCKETS_MS: [u64; 3] = [100, 500, 1000];

/// Counter registry shared across handlers.
#[derive(Default)]
pub struct Metrics {
    http_requests: Mutex<HashMap<(String, u16), u64>>,
    webhook_results: [AtomicU64; 4],
    latency_buckets: [AtomicU64; 4],
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one HTTP request by path and status.
    pub fn record_http(&self, path: &str, status: u16) {
        // Counters are best-effort; a poisoned lock just drops the sample.
        let Ok(mut map) = self.http_requests.lock() else {
            return;
        };
        *map.entry((path.to_string(), status)).or_insert(0) += 1;
    }

    /// Count one webhook outcome by result tag.
    pub fn record_webhook(&self, result: WebhookResult) {
        self.webhook_results[result.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record one request latency observation.
    pub fn observe_latency(&self, ms: u64) {
        for (i, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if ms <= *bound {
                self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.latency_buckets[LATENCY_BUCKETS_MS.len()].fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters as Prometheus-style text lines.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if let Ok(map) = self.http_requests.lock() {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort();
            for ((path, status), count) in entries {
                lines.push(format!(
                    "http_requests_total{{path=\"{path}\",status=\"{status}\"}} {count}"
                ));
            }
        }

        for result in WEBHOOK_RESULTS {
            let count = self.webhook_results[result.index()].load(Ordering::Relaxed);
            if count > 0 {
                lines.push(format!(
                    "webhook_requests_total{{result=\"{}\"}} {count}",
                    result.as_str()
                ));
            }
        }

        // Untouched buckets are omitted, same as the counter groups above;
        // the total count line is always present.
        let mut total_observations = 0u64;
        for (i, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            let count = self.latency_buckets[i].load(Ordering::Relaxed);
            total_observations += count;
            if count > 0 {
                lines.push(format!(
                    "request_latency_ms_bucket{{le=\"{bound}\"}} {count}"
                ));
            }
        }
        let overflow = self.latency_buckets[LATENCY_BUCKETS_MS.len()].load(Ordering::Relaxed);
        total_observations += overflow;
        if overflow > 0 {
            lines.push(format!("request_latency_ms_bucket{{le=\"+Inf\"}} {overflow}"));
        }
        lines.push(format!("request_latency_ms_count {total_observations}"));

        lines.join("\n")
    }
}
