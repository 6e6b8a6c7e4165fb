//! Login error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that abort a login attempt.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The OS entropy source could not produce random bytes.
    #[error("failed to gather randomness: {0}")]
    RandomSource(getrandom::Error),

    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The local callback listener could not bind its port.
    #[error("failed to start callback listener on {addr}: {source}")]
    ListenerBind {
        /// Address the listener tried to bind.
        addr: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provider redirected back with an error, or without a code.
    #[error("authorization failed: {reason}")]
    Callback {
        /// Provider error, with description when one was sent.
        reason: String,
    },

    /// The callback carried a state that was not issued by this attempt.
    #[error("state mismatch in callback: expected {expected}, got {actual}")]
    StateMismatch {
        /// State sent in the authorization request.
        expected: String,
        /// State received in the callback.
        actual: String,
    },

    /// The listener stopped before delivering a callback.
    #[error("callback listener stopped before a callback arrived")]
    ListenerClosed,

    /// No callback arrived within the allowed window.
    #[error("authentication timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The code-for-token exchange failed.
    #[error("failed to exchange code for token: {0}")]
    TokenExchange(#[from] ExchangeError),

    /// The token endpoint answered without an identity token.
    #[error("no identity token in `{field}` of the token response")]
    MissingIdentityToken {
        /// Name of the extension field that was expected.
        field: String,
        /// Whether the provider still issued an access token.
        access_token_issued: bool,
    },

    /// Reading the authorization code from the terminal failed.
    #[error("failed to read authorization code: {0}")]
    Prompt(#[source] std::io::Error),
}

impl LoginError {
    /// Create a callback error from any message.
    pub fn callback(reason: impl Into<String>) -> Self {
        Self::Callback {
            reason: reason.into(),
        }
    }

    /// Short name of the login stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::RandomSource(_) => "pkce",
            Self::Configuration(_) => "configuration",
            Self::ListenerBind { .. } | Self::ListenerClosed => "callback listener",
            Self::Callback { .. } | Self::StateMismatch { .. } | Self::Prompt(_) => "authorization",
            Self::Timeout(_) => "authorization wait",
            Self::TokenExchange(_) | Self::MissingIdentityToken { .. } => "token exchange",
        }
    }

    /// Whether starting a fresh login attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Callback { .. }
                | Self::StateMismatch { .. }
                | Self::ListenerClosed
                | Self::TokenExchange(_)
        )
    }
}

/// Causes of a failed token exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport-level failure, including the client timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an OAuth error document.
    #[error("provider returned {status}: {error}{}", description_suffix(.description))]
    Provider {
        /// HTTP status code.
        status: u16,
        /// OAuth `error` code.
        error: String,
        /// OAuth `error_description`, if any.
        description: Option<String>,
    },

    /// Non-success status without a parseable error document.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The success body was not a token response.
    #[error("invalid token response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn description_suffix(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" - {}", d),
        _ => String::new(),
    }
}

/// Failure to obtain a bootstrap token. Never fatal.
#[derive(Debug, Error)]
pub enum BootstrapTokenError {
    /// No backend credentials to request a token with.
    #[error("no Vault token available")]
    Unauthenticated,

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("Vault returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response did not carry wrapping information.
    #[error("no wrap_info in response")]
    MissingWrapInfo,
}

/// Failure to launch the system browser. Never fatal.
#[derive(Debug, Error)]
#[error("failed to open browser: {0}")]
pub struct BrowserLaunchError(#[source] pub std::io::Error);

/// Degraded-but-continuing conditions reported during a login.
#[derive(Debug, Error)]
pub enum LoginWarning {
    /// Auto-login is unavailable for this attempt.
    #[error("could not create wrapped token for auto-login ({0})")]
    Bootstrap(#[from] BootstrapTokenError),

    /// The URL has to be opened by hand.
    #[error("{0}")]
    BrowserLaunch(#[from] BrowserLaunchError),
}

/// Result type for login operations.
pub type Result<T> = std::result::Result<T, LoginError>;
