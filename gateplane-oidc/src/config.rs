//! Login configuration.

use std::time::Duration;

/// Port registered with the provider as part of the redirect URI.
pub const DEFAULT_CALLBACK_PORT: u16 = 45450;

/// Path of the local callback endpoint.
pub const DEFAULT_CALLBACK_PATH: &str = "/oidc/callback";

/// Name of the OIDC provider configured in Vault.
pub const DEFAULT_PROVIDER: &str = "gateplane";

/// Scopes requested by default.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "messenger_options"];

/// Configuration for one interactive login.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Base address of the Vault server hosting the provider.
    pub provider_address: String,
    /// Name of the OIDC provider inside Vault.
    pub provider_name: String,
    /// Requested scopes, in order.
    pub scopes: Vec<String>,
    /// Host used in the redirect URI.
    pub callback_host: String,
    /// Local host the listener binds; every address it resolves to is bound,
    /// so `localhost` covers both `127.0.0.1` and `::1`.
    pub bind_address: String,
    /// Listener port.
    pub callback_port: u16,
    /// Listener path.
    pub callback_path: String,
    /// How long to wait for the browser callback.
    pub callback_timeout: Duration,
    /// Timeout for the token exchange request.
    pub exchange_timeout: Duration,
    /// Token response field carrying the identity token.
    pub identity_token_field: String,
}

impl LoginConfig {
    /// Create a configuration for the provider at `provider_address`.
    pub fn new(provider_address: impl Into<String>) -> Self {
        Self {
            provider_address: provider_address.into(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            callback_host: "localhost".to_string(),
            bind_address: "localhost".to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            callback_timeout: Duration::from_secs(5 * 60),
            exchange_timeout: Duration::from_secs(30),
            identity_token_field: "id_token".to_string(),
        }
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Replace the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the callback port.
    #[must_use]
    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    /// Set the callback path.
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Set the callback timeout.
    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Set the token exchange timeout.
    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Set the token response field holding the identity token.
    #[must_use]
    pub fn with_identity_token_field(mut self, field: impl Into<String>) -> Self {
        self.identity_token_field = field.into();
        self
    }

    /// Normalized callback path, always starting with `/`.
    pub fn normalized_callback_path(&self) -> String {
        format!("/{}", self.callback_path.trim_start_matches('/'))
    }

    /// The redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.callback_host,
            self.callback_port,
            self.normalized_callback_path()
        )
    }

    /// Address the callback listener binds.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.callback_port)
    }

    /// The provider's authorization endpoint (served by the Vault UI).
    pub fn authorize_endpoint(&self) -> String {
        format!(
            "{}/ui/vault/identity/oidc/provider/{}/authorize",
            self.base(),
            self.provider_name
        )
    }

    /// The provider's token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/v1/identity/oidc/provider/{}/token",
            self.base(),
            self.provider_name
        )
    }

    fn base(&self) -> &str {
        self.provider_address.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = LoginConfig::new("https://vault.example.com");
        assert_eq!(config.redirect_uri(), "http://localhost:45450/oidc/callback");
        assert_eq!(config.listen_address(), "localhost:45450");
        assert_eq!(config.scopes, vec!["openid", "profile", "messenger_options"]);
        assert_eq!(config.callback_timeout, Duration::from_secs(300));
        assert_eq!(config.exchange_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_endpoints_trim_trailing_slash() {
        let config = LoginConfig::new("https://vault.example.com:8200/");
        assert_eq!(
            config.authorize_endpoint(),
            "https://vault.example.com:8200/ui/vault/identity/oidc/provider/gateplane/authorize"
        );
        assert_eq!(
            config.token_endpoint(),
            "https://vault.example.com:8200/v1/identity/oidc/provider/gateplane/token"
        );
    }

    #[test]
    fn test_builder() {
        let config = LoginConfig::new("http://127.0.0.1:8200")
            .with_provider_name("internal")
            .with_scopes(["openid"])
            .with_callback_port(50000)
            .with_callback_path("cb")
            .with_callback_timeout(Duration::from_secs(1));
        assert_eq!(config.redirect_uri(), "http://localhost:50000/cb");
        assert_eq!(config.normalized_callback_path(), "/cb");
        assert!(config.token_endpoint().contains("/provider/internal/token"));
        assert_eq!(config.scopes, vec!["openid"]);
    }
}
