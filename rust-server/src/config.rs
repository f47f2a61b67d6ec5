//! Configuration module for environment variable parsing.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for webhook HMAC-SHA256 signature verification.
    ///
    /// The binary refuses to start when this is missing or blank; per-request
    /// code can assume a configured secret.
    pub webhook_secret: Option<String>,

    /// SQLite database URL
    pub database_url: String,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://messages.db".to_string()),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }

    /// Whether a non-blank shared secret is configured.
    ///
    /// Checked once at startup (fatal when false) and again by the readiness
    /// probe.
    pub fn secret_configured(&self) -> bool {
        self.webhook_secret
            .as_ref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}
