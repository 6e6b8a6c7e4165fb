//! Authorization URL construction.

use url::Url;

use crate::bootstrap::BootstrapToken;
use crate::error::{LoginError, Result};
use crate::pkce::CHALLENGE_METHOD;

/// Parameters of one authorization request. Immutable once built.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// OAuth client ID.
    pub client_id: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Requested scopes, in order.
    pub scopes: Vec<String>,
    /// CSRF state.
    pub state: String,
    /// PKCE S256 challenge.
    pub challenge: String,
    /// Wrapped token enabling auto-login in the browser.
    pub bootstrap_token: Option<BootstrapToken>,
}

impl AuthorizationRequest {
    /// Render the full authorization URL against `endpoint`.
    ///
    /// Pure: no I/O happens here. Every query value is percent-encoded.
    pub fn to_url(&self, endpoint: &str) -> Result<String> {
        let mut url = Url::parse(endpoint).map_err(|e| {
            LoginError::Configuration(format!("invalid authorization endpoint {}: {}", endpoint, e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &self.bootstrap_token {
                query
                    .append_pair("wrapped_token", token.expose())
                    .append_pair("with", "token");
            }
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("code_challenge", &self.challenge)
                .append_pair("code_challenge_method", CHALLENGE_METHOD)
                .append_pair("state", &self.state);
        }

        Ok(url.into())
    }
}
