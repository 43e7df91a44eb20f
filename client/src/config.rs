//! Client configuration.
//!
//! Loaded from environment variables with sensible defaults; nothing here is
//! required to be set for local development against a local API.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the client stores and their HTTP transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the external REST API
    pub api_url: String,
    /// Path of the durable session file (token + user record)
    pub session_file: PathBuf,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// - `BOOKSPHERE_API_URL` (default `http://localhost:8000/api`)
    /// - `BOOKSPHERE_SESSION_FILE` (default `.booksphere-session.json`)
    /// - `BOOKSPHERE_REQUEST_TIMEOUT` in seconds (default 30)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("BOOKSPHERE_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
            session_file: env::var("BOOKSPHERE_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".booksphere-session.json")),
            request_timeout: env::var("BOOKSPHERE_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(Duration::from_secs(30), Duration::from_secs),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        // The BOOKSPHERE_* variables are not set in the test environment.
        let config = ClientConfig::from_env();
        assert_eq!(config.api_url, "http://localhost:8000/api");
        assert_eq!(
            config.session_file,
            PathBuf::from(".booksphere-session.json")
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
