//! Client configuration
//!
//! Everything the engine needs to reach the remote authority: base
//! URL, the authenticated user's id (which also names the storage
//! namespace), credentials, and the periodic sync interval.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Default periodic reconciliation interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Credentials presented on every gateway request.
///
/// The bearer token proves identity; the shared secret is an
/// additional access gate the backend requires independently.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bearer_token: String,
    pub shared_secret: String,
}

impl Credentials {
    /// Validate and normalize both credentials; neither may be blank.
    pub fn new(bearer_token: impl Into<String>, shared_secret: impl Into<String>) -> Result<Self> {
        let bearer_token = normalize_text_option(Some(bearer_token.into()))
            .ok_or_else(|| Error::InvalidInput("bearer token must not be empty".to_string()))?;
        let shared_secret = normalize_text_option(Some(shared_secret.into()))
            .ok_or_else(|| Error::InvalidInput("shared secret must not be empty".to_string()))?;
        Ok(Self {
            bearer_token,
            shared_secret,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("bearer_token", &"[REDACTED]")
            .field("shared_secret", &"[REDACTED]")
            .finish()
    }
}

/// Configuration for one client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Remote authority base URL, no trailing slash
    pub base_url: String,
    /// User the session belongs to; also keys the storage namespace
    pub user_id: String,
    pub credentials: Credentials,
    /// Periodic reconciliation interval
    pub sync_interval: Duration,
}

impl ClientConfig {
    /// Create a configuration with the default sync interval.
    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::InvalidInput("base URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "base URL must include http:// or https://".to_string(),
            ));
        }
        let user_id = normalize_text_option(Some(user_id.into()))
            .ok_or_else(|| Error::InvalidInput("user id must not be empty".to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
            credentials,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        })
    }

    /// Set the periodic sync interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}
