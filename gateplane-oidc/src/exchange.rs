//! Authorization-code-for-token exchange.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::LoginConfig;
use crate::error::{ExchangeError, LoginError, Result};
use crate::token::IdentityToken;

/// Inputs of one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest<'a> {
    /// OAuth client ID.
    pub client_id: &'a str,
    /// Authorization code from the callback.
    pub code: &'a str,
    /// PKCE verifier matching the challenge that was sent.
    pub verifier: &'a str,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: &'a str,
}

/// Exchanges an authorization code for an identity token.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    /// Perform the exchange.
    async fn exchange(&self, request: ExchangeRequest<'_>) -> Result<IdentityToken>;
}

/// Token endpoint response. Unknown members land in `extra`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// OAuth error document (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`CodeExchanger`] talking to the provider's token endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    client: Client,
    token_url: String,
    identity_field: String,
}

impl TokenExchanger {
    /// Create an exchanger for the provider described by `config`.
    pub fn new(config: &LoginConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.exchange_timeout)
            .build()
            .map_err(|e| LoginError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: Client, config: &LoginConfig) -> Self {
        Self {
            client,
            token_url: config.token_endpoint(),
            identity_field: config.identity_token_field.clone(),
        }
    }

    /// The token endpoint this exchanger posts to.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn extract_identity_token(&self, response: TokenResponse) -> Result<IdentityToken> {
        let access_token_issued = response
            .access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        info!(
            access_token_issued,
            token_type = response.token_type.as_deref().unwrap_or(""),
            "Token response received"
        );

        match response.extra.get(&self.identity_field).and_then(|v| v.as_str()) {
            Some(token) if !token.is_empty() => Ok(IdentityToken::new(token)),
            _ => {
                let available: Vec<&str> = response.extra.keys().map(String::as_str).collect();
                debug!(?available, field = %self.identity_field, "Identity token field missing");
                Err(LoginError::MissingIdentityToken {
                    field: self.identity_field.clone(),
                    access_token_issued,
                })
            }
        }
    }
}

#[async_trait]
impl CodeExchanger for TokenExchanger {
    async fn exchange(&self, request: ExchangeRequest<'_>) -> Result<IdentityToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", request.code),
            ("redirect_uri", request.redirect_uri),
            ("client_id", request.client_id),
            ("code_verifier", request.verifier),
        ];

        debug!(url = %self.token_url, "Exchanging authorization code");

        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(ExchangeError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(ExchangeError::from)?;

        if !status.is_success() {
            let err = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(e) => ExchangeError::Provider {
                    status: status.as_u16(),
                    error: e.error,
                    description: e.error_description,
                },
                Err(_) => ExchangeError::Status {
                    status: status.as_u16(),
                    body,
                },
            };
            return Err(err.into());
        }

        let tokens: TokenResponse = serde_json::from_str(&body).map_err(ExchangeError::from)?;
        self.extract_identity_token(tokens)
    }
}
