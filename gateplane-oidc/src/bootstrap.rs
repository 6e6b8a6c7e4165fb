//! Wrapped bootstrap tokens for auto-login.
//!
//! The provider's login page can consume a response-wrapped Vault token
//! (`wrapped_token=...&with=token`) and skip its own sign-in form. Creating
//! one is best-effort: any failure just means the user signs in by hand.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::BootstrapTokenError;

/// Lifetime of the wrapping token.
pub const WRAP_TTL: &str = "1m";

/// A single-use, short-lived wrapped token.
#[derive(Clone)]
pub struct BootstrapToken(String);

impl BootstrapToken {
    /// Wrap a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw value. Only the authorization URL should see it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BootstrapToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BootstrapToken(<redacted>)")
    }
}

/// Source of bootstrap tokens.
#[async_trait]
pub trait BootstrapTokenIssuer: Send + Sync {
    /// Request a fresh bootstrap token.
    async fn create_bootstrap_token(&self) -> Result<BootstrapToken, BootstrapTokenError>;
}

#[derive(Debug, Deserialize)]
struct WrappedResponse {
    #[serde(default)]
    wrap_info: Option<WrapInfo>,
}

#[derive(Debug, Deserialize)]
struct WrapInfo {
    #[serde(default)]
    token: String,
}

/// Issues bootstrap tokens by asking Vault to wrap a new child token.
#[derive(Debug, Clone)]
pub struct VaultBootstrapIssuer {
    client: reqwest::Client,
    address: String,
    token: String,
    namespace: Option<String>,
}

impl VaultBootstrapIssuer {
    /// Create an issuer authenticated with `token` against `address`.
    pub fn new(
        address: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, BootstrapTokenError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            address: address.into(),
            token: token.into(),
            namespace: None,
        })
    }

    /// Send requests inside a Vault namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    fn create_url(&self) -> String {
        format!("{}/v1/auth/token/create", self.address.trim_end_matches('/'))
    }
}

#[async_trait]
impl BootstrapTokenIssuer for VaultBootstrapIssuer {
    async fn create_bootstrap_token(&self) -> Result<BootstrapToken, BootstrapTokenError> {
        if self.token.is_empty() {
            return Err(BootstrapTokenError::Unauthenticated);
        }

        debug!(url = %self.create_url(), ttl = WRAP_TTL, "Requesting wrapped token");

        let mut request = self
            .client
            .post(self.create_url())
            .header("X-Vault-Token", &self.token)
            .header("X-Vault-Wrap-TTL", WRAP_TTL)
            .header("X-Vault-Request", "true")
            .json(&serde_json::json!({}));
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BootstrapTokenError::Status { status, body });
        }

        let wrapped: WrappedResponse = response.json().await?;
        match wrapped.wrap_info {
            Some(info) if !info.token.is_empty() => Ok(BootstrapToken::new(info.token)),
            _ => Err(BootstrapTokenError::MissingWrapInfo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_creates_wrapped_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/create"))
            .and(header("X-Vault-Token", "s.parent"))
            .and(header("X-Vault-Wrap-TTL", "1m"))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "",
                "auth": null,
                "wrap_info": {
                    "token": "hvs.wrapped",
                    "ttl": 60,
                    "creation_path": "auth/token/create"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issuer = VaultBootstrapIssuer::new(server.uri(), "s.parent")
            .unwrap()
            .with_namespace("team-a");
        let token = issuer.create_bootstrap_token().await.unwrap();
        assert_eq!(token.expose(), "hvs.wrapped");
    }

    #[tokio::test]
    async fn test_missing_wrap_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "auth": { "client_token": "s.child" }
            })))
            .mount(&server)
            .await;

        let issuer = VaultBootstrapIssuer::new(server.uri(), "s.parent").unwrap();
        let err = issuer.create_bootstrap_token().await.unwrap_err();
        assert!(matches!(err, BootstrapTokenError::MissingWrapInfo));
    }

    #[tokio::test]
    async fn test_rejected_by_vault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/create"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string(r#"{"errors":["permission denied"]}"#),
            )
            .mount(&server)
            .await;

        let issuer = VaultBootstrapIssuer::new(server.uri(), "s.parent").unwrap();
        let err = issuer.create_bootstrap_token().await.unwrap_err();
        match err {
            BootstrapTokenError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_requires_token() {
        let issuer = VaultBootstrapIssuer::new("http://127.0.0.1:1", "").unwrap();
        let err = issuer.create_bootstrap_token().await.unwrap_err();
        assert!(matches!(err, BootstrapTokenError::Unauthenticated));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = BootstrapToken::new("hvs.secret");
        assert!(!format!("{:?}", token).contains("hvs.secret"));
    }
}
