//! Remote data gateway
//!
//! A pure translation layer: one `(entity type, operation)` pair
//! becomes one authenticated HTTP call against the remote authority.
//! No retries and no local state; retry policy lives in the sync
//! engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::Credentials;
use crate::models::EntityType;
use crate::util::is_http_url;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Header carrying the shared-secret access gate.
const SHARED_SECRET_HEADER: &str = "X-Basic-Auth";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing/invalid configuration; the request was never issued
    #[error("Gateway auth error: {0}")]
    Auth(String),
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Gateway HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-success status from the remote authority
    #[error("Remote API error: {message} ({status})")]
    Remote { status: u16, message: String },
    /// Response body could not be decoded
    #[error("Invalid remote payload: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether this failure means the credential will never succeed.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Client-side rejections (4xx other than auth) that will fail the
    /// same way on every retry.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Remote { status, .. } if *status >= 400 && *status < 500)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Typed adapter for the remote authority's per-entity REST surface.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch the canonical remote set for one entity type.
    async fn list(&self, entity_type: EntityType) -> GatewayResult<Vec<Value>>;

    /// Create a record; the response includes the assigned id.
    async fn create(&self, entity_type: EntityType, payload: &Value) -> GatewayResult<Value>;

    /// Update an existing record by its remote id.
    async fn update(&self, entity_type: EntityType, id: &str, payload: &Value)
        -> GatewayResult<Value>;

    /// Delete a record by its remote id. Idempotent: a missing id is
    /// not a hard failure.
    async fn delete(&self, entity_type: EntityType, id: &str) -> GatewayResult<()>;
}

/// `reqwest`-backed gateway against the ClinicNote REST authority.
#[derive(Clone)]
pub struct HttpRemoteGateway {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl HttpRemoteGateway {
    /// Build a gateway. Fails fast when the base URL is malformed;
    /// credential presence is enforced by `Credentials` itself.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> GatewayResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(GatewayError::Auth(
                "base URL must include http:// or https://".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            credentials,
            client,
        })
    }

    fn url(&self, entity_type: EntityType) -> String {
        format!("{}{}", self.base_url, entity_type.api_path())
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.credentials.bearer_token)
            .header(SHARED_SECRET_HEADER, &self.credentials.shared_secret)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn check(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(GatewayError::Auth(message))
        } else {
            Err(GatewayError::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpRemoteGateway {
    async fn list(&self, entity_type: EntityType) -> GatewayResult<Vec<Value>> {
        let response = self.authed(self.client.get(self.url(entity_type))).send().await?;
        let response = Self::check(response).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn create(&self, entity_type: EntityType, payload: &Value) -> GatewayResult<Value> {
        let response = self
            .authed(self.client.post(self.url(entity_type)))
            .json(payload)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &Value,
    ) -> GatewayResult<Value> {
        let url = format!("{}/{id}", self.url(entity_type));
        let response = self.authed(self.client.put(url)).json(payload).send().await?;
        let response = Self::check(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> GatewayResult<()> {
        let url = format!("{}/{id}", self.url(entity_type));
        let response = self.authed(self.client.delete(url)).send().await?;

        // The record being gone already is the outcome we wanted.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(entity = %entity_type, id, "remote record already absent on delete");
            return Ok(());
        }

        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed.chars().take(180).collect::<String>(), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("token", "secret").unwrap()
    }

    #[test]
    fn test_rejects_base_url_without_scheme() {
        assert!(HttpRemoteGateway::new("api.example.com", credentials()).is_err());
    }

    #[test]
    fn test_trims_trailing_slash() {
        let gateway = HttpRemoteGateway::new("https://api.example.com/", credentials()).unwrap();
        assert_eq!(
            gateway.url(EntityType::Clinic),
            "https://api.example.com/api/clinics"
        );
        assert_eq!(
            gateway.url(EntityType::DoctorMemo),
            "https://api.example.com/api/appointments/doctor-memos"
        );
    }

    #[test]
    fn test_parse_api_error_prefers_message_field() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"message": "clinic name required"}"#,
        );
        assert_eq!(message, "clinic name required (400)");
    }

    #[test]
    fn test_parse_api_error_falls_back_to_body() {
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom (500)"
        );
    }

    #[test]
    fn test_rejection_classification() {
        let rejected = GatewayError::Remote {
            status: 422,
            message: "invalid".to_string(),
        };
        assert!(rejected.is_rejection());

        let transient = GatewayError::Remote {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(!transient.is_rejection());
        assert!(GatewayError::Auth("nope".to_string()).is_auth());
    }
}
