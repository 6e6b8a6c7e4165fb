//! Interactive login orchestration.
//!
//! [`LoginFlow::perform_interactive_login`] drives one attempt:
//!
//! 1. Generate a PKCE pair and a `state` value
//! 2. Try to obtain a bootstrap token for auto-login (best-effort)
//! 3. Build the authorization URL
//! 4. Either start the callback listener, open the browser and wait for the
//!    redirect or the timeout, whichever comes first; or, with
//!    `skip_browser`, print the URL and read the code from the terminal
//! 5. Exchange the code for an identity token
//!
//! The listener is shut down on every path out of step 4 before anything
//! else happens.
//!
//! **Important**: this module does NOT store tokens. Persisting the returned
//! identity token is the caller's responsibility.

use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::authorize::AuthorizationRequest;
use crate::bootstrap::{BootstrapToken, BootstrapTokenIssuer};
use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::LoginConfig;
use crate::error::{BrowserLaunchError, LoginError, LoginWarning, Result};
use crate::exchange::{CodeExchanger, ExchangeRequest, TokenExchanger};
use crate::listener::{CallbackListener, CallbackReceiver, CallbackResult, NO_CODE_REASON};
use crate::pkce::{generate_state, PkcePair};
use crate::prompt::{BrowserStatus, LoginPrompt, TerminalPrompt};
use crate::token::IdentityToken;

/// Drives interactive logins against one provider.
pub struct LoginFlow {
    config: LoginConfig,
    issuer: Option<Arc<dyn BootstrapTokenIssuer>>,
    browser: Arc<dyn BrowserLauncher>,
    exchanger: Arc<dyn CodeExchanger>,
    prompt: Arc<dyn LoginPrompt>,
}

impl LoginFlow {
    /// Create a flow using the system browser, the terminal and the
    /// provider's token endpoint.
    pub fn new(config: LoginConfig) -> Result<Self> {
        let exchanger = TokenExchanger::new(&config)?;
        Ok(Self {
            config,
            issuer: None,
            browser: Arc::new(SystemBrowser),
            exchanger: Arc::new(exchanger),
            prompt: Arc::new(TerminalPrompt),
        })
    }

    /// Enable auto-login through bootstrap tokens from `issuer`.
    #[must_use]
    pub fn with_bootstrap_issuer<I: BootstrapTokenIssuer + 'static>(mut self, issuer: I) -> Self {
        self.issuer = Some(Arc::new(issuer));
        self
    }

    /// Replace the browser launcher.
    #[must_use]
    pub fn with_browser<B: BrowserLauncher + 'static>(mut self, browser: B) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    /// Replace the code exchanger.
    #[must_use]
    pub fn with_exchanger<E: CodeExchanger + 'static>(mut self, exchanger: E) -> Self {
        self.exchanger = Arc::new(exchanger);
        self
    }

    /// Replace the prompt.
    #[must_use]
    pub fn with_prompt<P: LoginPrompt + 'static>(mut self, prompt: P) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// The configuration this flow was built with.
    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Run one login attempt and return the provider's identity token.
    pub async fn perform_interactive_login(
        &self,
        client_id: &str,
        skip_browser: bool,
    ) -> Result<IdentityToken> {
        if client_id.trim().is_empty() {
            return Err(LoginError::Configuration(
                "client ID is required".to_string(),
            ));
        }

        let pkce = PkcePair::generate()?;
        let state = generate_state()?;
        let bootstrap_token = self.bootstrap_token().await;

        let redirect_uri = self.config.redirect_uri();
        let request = AuthorizationRequest {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.clone(),
            scopes: self.config.scopes.clone(),
            state,
            challenge: pkce.challenge().to_string(),
            bootstrap_token,
        };
        let auth_url = request.to_url(&self.config.authorize_endpoint())?;
        debug!(client_id, redirect_uri = %redirect_uri, "Authorization URL built");

        let code = if skip_browser {
            self.read_code_manually(&auth_url, &request.state).await?
        } else {
            self.receive_code(&auth_url, &request.state).await?
        };

        info!("Authorization code received, exchanging it for an identity token");
        self.exchanger
            .exchange(ExchangeRequest {
                client_id,
                code: &code,
                verifier: pkce.verifier(),
                redirect_uri: &redirect_uri,
            })
            .await
    }

    async fn bootstrap_token(&self) -> Option<BootstrapToken> {
        let issuer = self.issuer.as_ref()?;
        match issuer.create_bootstrap_token().await {
            Ok(token) => {
                info!("Generated wrapped token for auto-login");
                Some(token)
            }
            Err(e) => {
                self.report(LoginWarning::Bootstrap(e));
                None
            }
        }
    }

    /// Browser path: listener, browser, bounded wait, shutdown.
    async fn receive_code(&self, auth_url: &str, expected_state: &str) -> Result<String> {
        let (mut listener, receiver) = CallbackListener::bind(
            &self.config.listen_address(),
            &self.config.normalized_callback_path(),
        )
        .await?;

        let outcome = self.await_callback(auth_url, receiver).await;
        listener.shutdown().await;

        accept_callback(outcome?, expected_state)
    }

    async fn await_callback(&self, auth_url: &str, receiver: CallbackReceiver) -> Result<CallbackResult> {
        self.prompt.listener_started(&self.config.redirect_uri());

        let status = match self.open_browser(auth_url).await {
            Ok(()) => BrowserStatus::Opened,
            Err(e) => {
                self.report(LoginWarning::BrowserLaunch(e));
                BrowserStatus::Failed
            }
        };
        self.prompt.auth_url_ready(auth_url, status);
        self.prompt.waiting_for_callback();

        let timeout = self.config.callback_timeout;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(LoginError::ListenerClosed),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "No callback received in time");
                Err(LoginError::Timeout(timeout))
            }
        }
    }

    /// Launching a browser can block on process spawn, so it runs off the
    /// runtime threads.
    async fn open_browser(&self, auth_url: &str) -> std::result::Result<(), BrowserLaunchError> {
        let browser = self.browser.clone();
        let url = auth_url.to_string();
        tokio::task::spawn_blocking(move || browser.open(&url))
            .await
            .map_err(|e| BrowserLaunchError(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Manual path: the listener is never started.
    async fn read_code_manually(&self, auth_url: &str, expected_state: &str) -> Result<String> {
        let prompt = self.prompt.clone();
        let url = auth_url.to_string();
        let input = tokio::task::spawn_blocking(move || prompt.read_authorization_code(&url))
            .await
            .map_err(|e| LoginError::Prompt(io::Error::new(io::ErrorKind::Other, e)))?
            .map_err(LoginError::Prompt)?;
        let input = input.trim();

        // Accept a pasted callback URL as well as a bare code.
        if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input)
                .map_err(|e| LoginError::callback(format!("invalid callback URL: {}", e)))?;
            return accept_callback(CallbackResult::from_url(&url), expected_state);
        }

        if input.is_empty() {
            return Err(LoginError::callback(NO_CODE_REASON));
        }
        Ok(input.to_string())
    }

    fn report(&self, warning: LoginWarning) {
        warn!(%warning, "Continuing login with reduced functionality");
        self.prompt.warning(&warning);
    }
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("config", &self.config)
            .field("auto_login", &self.issuer.is_some())
            .finish()
    }
}

fn accept_callback(result: CallbackResult, expected_state: &str) -> Result<String> {
    match result {
        CallbackResult::Success { code, state } if state == expected_state => Ok(code),
        CallbackResult::Success { state, .. } => Err(LoginError::StateMismatch {
            expected: expected_state.to_string(),
            actual: state,
        }),
        CallbackResult::Failure { reason } => Err(LoginError::callback(reason)),
    }
}
