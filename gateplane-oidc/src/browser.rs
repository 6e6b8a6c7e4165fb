//! System browser launching.

use crate::error::BrowserLaunchError;

/// Opens a URL for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. Failure is reported, never fatal.
    fn open(&self, url: &str) -> Result<(), BrowserLaunchError>;
}

/// Launches the user's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), BrowserLaunchError> {
        webbrowser::open(url).map_err(BrowserLaunchError)
    }
}
