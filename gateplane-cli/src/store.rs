//! Persistent CLI settings in `~/.gateplane/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Overrides the settings directory.
pub const CONFIG_DIR_ENV: &str = "GATEPLANE_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Everything the CLI remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub vault: VaultSettings,
    #[serde(default)]
    pub service: ServiceSettings,
}

/// Vault connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// GatePlane Services credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

/// TOML-backed settings file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Store in `$GATEPLANE_CONFIG_DIR`, or `~/.gateplane`.
    pub fn locate() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::at(dir));
        }
        let home = dirs::home_dir().context("failed to get home directory")?;
        Ok(Self::at(home.join(".gateplane")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Load the settings. A missing file yields the defaults.
    pub fn load(&self) -> Result<Settings> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Write the settings. The file holds credentials and is owner-only on Unix.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.path();
        let contents = toml::to_string_pretty(settings).context("failed to serialize config")?;
        write_private(&path, contents.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Vault settings visible in the process environment.
#[derive(Debug, Clone, Default)]
pub struct VaultEnv {
    pub address: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
    /// Contents of `~/.vault-token`, written by `vault login`.
    pub token_file: Option<String>,
}

impl VaultEnv {
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            address: var("VAULT_ADDR"),
            token: var("VAULT_TOKEN"),
            namespace: var("VAULT_NAMESPACE"),
            token_file: dirs::home_dir()
                .and_then(|home| fs::read_to_string(home.join(".vault-token")).ok()),
        }
    }
}

/// Vault settings after applying precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVault {
    pub address: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
}

/// Resolve flag, then environment, then `~/.vault-token` (token only), then file.
pub fn resolve_vault(
    flag_address: Option<&str>,
    flag_token: Option<&str>,
    env: &VaultEnv,
    file: &VaultSettings,
) -> ResolvedVault {
    ResolvedVault {
        address: first_present([
            flag_address,
            env.address.as_deref(),
            file.address.as_deref(),
        ]),
        token: first_present([
            flag_token,
            env.token.as_deref(),
            env.token_file.as_deref(),
            file.token.as_deref(),
        ]),
        namespace: first_present([env.namespace.as_deref(), file.namespace.as_deref()]),
    }
}

fn first_present<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
