//! User-facing messages during a login.

use std::io::{self, BufRead, Write};

use crate::error::LoginWarning;

/// Whether the browser could be opened for the authorization URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserStatus {
    /// The browser was asked to open the URL.
    Opened,
    /// The user has to open the URL by hand.
    Failed,
}

/// Status updates and input for an interactive login.
pub trait LoginPrompt: Send + Sync {
    /// The callback listener is accepting redirects.
    fn listener_started(&self, redirect_uri: &str);

    /// The authorization URL is ready.
    fn auth_url_ready(&self, url: &str, browser: BrowserStatus);

    /// The login is now blocked on the browser.
    fn waiting_for_callback(&self);

    /// A degraded condition occurred; the login continues.
    fn warning(&self, warning: &LoginWarning);

    /// Show `url` and read the authorization code typed by the user.
    ///
    /// Blocking; called off the async runtime threads.
    fn read_authorization_code(&self, url: &str) -> io::Result<String>;
}

/// Prompt writing to the terminal and reading codes from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl LoginPrompt for TerminalPrompt {
    fn listener_started(&self, redirect_uri: &str) {
        println!("Starting local callback server at {}...", redirect_uri);
    }

    fn auth_url_ready(&self, url: &str, browser: BrowserStatus) {
        match browser {
            BrowserStatus::Opened => {
                println!("Opening browser for OIDC authentication...");
                println!("If the browser doesn't open automatically, visit:");
            }
            BrowserStatus::Failed => {
                println!("Please visit the URL manually:");
            }
        }
        println!("  {}", url);
        println!();
    }

    fn waiting_for_callback(&self) {
        println!("Waiting for callback...");
    }

    fn warning(&self, warning: &LoginWarning) {
        eprintln!("Warning: {}", warning);
    }

    fn read_authorization_code(&self, url: &str) -> io::Result<String> {
        println!("Visit this URL in your browser:");
        println!("  {}", url);
        println!();
        print!("Enter the authorization code from the callback URL: ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
