//! # gateplane-oidc
//!
//! Interactive OAuth 2.0 Authorization Code + PKCE login against the
//! GatePlane OIDC provider hosted by Vault.
//!
//! A login opens the user's browser at the provider's authorize endpoint,
//! receives the redirect on a short-lived loopback listener and exchanges
//! the authorization code for an identity token.
//!
//! ## Core Concepts
//!
//! - **[`LoginFlow`]**: Orchestrates one login attempt
//! - **[`LoginConfig`]**: Provider address, callback port and timeouts
//! - **[`PkcePair`]**: S256 verifier/challenge pair
//! - **[`CallbackListener`]**: Single-use loopback redirect receiver
//! - **[`BootstrapTokenIssuer`]**: Optional auto-login through a
//!   response-wrapped Vault token
//! - **[`CodeExchanger`]**: Code-for-token exchange at the token endpoint
//!
//! ## Example
//!
//! ```ignore
//! use gateplane_oidc::{LoginConfig, LoginFlow, VaultBootstrapIssuer};
//!
//! let config = LoginConfig::new("https://vault.example.com:8200");
//! let issuer = VaultBootstrapIssuer::new(config.provider_address.clone(), vault_token)?;
//! let flow = LoginFlow::new(config)?.with_bootstrap_issuer(issuer);
//!
//! let token = flow.perform_interactive_login("my-client-id", false).await?;
//! ```
//!
//! Tokens are returned, never stored.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod authorize;
pub mod bootstrap;
pub mod browser;
pub mod config;
pub mod error;
pub mod exchange;
pub mod listener;
pub mod login;
pub mod pkce;
pub mod prompt;
pub mod templates;
pub mod token;

// Re-exports
pub use authorize::AuthorizationRequest;
pub use bootstrap::{BootstrapToken, BootstrapTokenIssuer, VaultBootstrapIssuer};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use config::{LoginConfig, DEFAULT_CALLBACK_PATH, DEFAULT_CALLBACK_PORT, DEFAULT_PROVIDER};
pub use error::{
    BootstrapTokenError, BrowserLaunchError, ExchangeError, LoginError, LoginWarning, Result,
};
pub use exchange::{CodeExchanger, ExchangeRequest, TokenExchanger};
pub use listener::{CallbackListener, CallbackOutcome, CallbackResult, ListenerState};
pub use login::LoginFlow;
pub use pkce::{compute_challenge, generate_state, PkcePair};
pub use prompt::{BrowserStatus, LoginPrompt, TerminalPrompt};
pub use token::{IdentityToken, TokenClaims};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        IdentityToken, LoginConfig, LoginError, LoginFlow, Result, VaultBootstrapIssuer,
    };
}
