//! `gateplane auth service` handlers.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use gateplane_oidc::{IdentityToken, LoginConfig, LoginFlow, VaultBootstrapIssuer};
use tracing::{debug, info};

use crate::cli::{GlobalArgs, ServiceAction};
use crate::store::{resolve_vault, ConfigStore, Settings, VaultEnv};

pub async fn service(action: ServiceAction, global: &GlobalArgs, store: &ConfigStore) -> Result<()> {
    match action {
        ServiceAction::Login {
            client_id,
            skip_browser,
        } => login(client_id, skip_browser, global, store).await,
        ServiceAction::Logout => logout(store),
        ServiceAction::Status => {
            let settings = store.load()?;
            for line in status_lines(&settings, Utc::now()) {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn login(
    client_id: Option<String>,
    skip_browser: bool,
    global: &GlobalArgs,
    store: &ConfigStore,
) -> Result<()> {
    let mut settings = store.load()?;

    let client_id = client_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| settings.service.client_id.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| anyhow!("client ID is required. Use --client-id flag or set it in config"))?;

    let vault = resolve_vault(
        global.vault_addr.as_deref(),
        global.vault_token.as_deref(),
        &VaultEnv::from_process(),
        &settings.vault,
    );
    let address = vault
        .address
        .context("Vault address is required. Use --vault-addr or set VAULT_ADDR")?;

    let mut flow = LoginFlow::new(LoginConfig::new(address.clone()))
        .context("failed to prepare OIDC login")?;
    match vault.token {
        Some(token) => {
            let issuer = VaultBootstrapIssuer::new(address, token)
                .context("failed to create Vault client")?
                .with_namespace(vault.namespace.unwrap_or_default());
            flow = flow.with_bootstrap_issuer(issuer);
        }
        None => debug!("No Vault token available, auto-login disabled"),
    }

    let token = flow
        .perform_interactive_login(&client_id, skip_browser)
        .await
        .context("OIDC login failed")?;

    settings.service.client_id = Some(client_id);
    settings.service.jwt = Some(token.into_inner());
    store
        .save(&settings)
        .context("failed to save authentication data")?;
    info!(path = %store.path().display(), "Identity token stored");

    println!("✓ Successfully authenticated with GatePlane Services");
    Ok(())
}

fn logout(store: &ConfigStore) -> Result<()> {
    let mut settings = store.load()?;
    settings.service.jwt = None;
    store.save(&settings).context("failed to clear service auth")?;
    println!("Logged out from GatePlane Services");
    Ok(())
}

fn status_lines(settings: &Settings, now: DateTime<Utc>) -> Vec<String> {
    let Some(jwt) = settings.service.jwt.as_deref().filter(|t| !t.is_empty()) else {
        return vec!["Not authenticated with GatePlane Services".to_string()];
    };

    let mut lines = Vec::new();
    if let Some(client_id) = &settings.service.client_id {
        lines.push(format!("Client ID: {}", client_id));
    }
    if let Some(address) = &settings.vault.address {
        lines.push(format!("Vault Address: {}", address));
    }

    let Some(claims) = IdentityToken::new(jwt).claims() else {
        lines.push("Authentication status: Unknown (token is not a readable JWT)".to_string());
        return lines;
    };
    if let Some(sub) = &claims.sub {
        lines.push(format!("Subject: {}", sub));
    }
    if let Some(iss) = &claims.iss {
        lines.push(format!("Issuer: {}", iss));
    }
    match claims.exp.and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)) {
        Some(expiry) => {
            lines.push(format!("Expires: {}", expiry.to_rfc3339()));
            if claims.is_expired_at(now.timestamp()) {
                lines.push("Authentication status: Expired".to_string());
            } else {
                lines.push("Authentication status: Valid".to_string());
            }
        }
        None => lines.push("Authentication status: Valid (no expiry)".to_string()),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_status_not_authenticated() {
        assert_eq!(
            status_lines(&Settings::default(), at(0)),
            vec!["Not authenticated with GatePlane Services".to_string()]
        );
    }

    #[test]
    fn test_status_valid_and_expired() {
        let mut settings = Settings::default();
        settings.service.client_id = Some("abc".into());
        settings.service.jwt = Some(jwt(r#"{"sub":"entity-1","exp":1700000000}"#));

        let lines = status_lines(&settings, at(1_699_999_000));
        assert_eq!(
            lines,
            vec![
                "Client ID: abc".to_string(),
                "Subject: entity-1".to_string(),
                "Expires: 2023-11-14T22:13:20+00:00".to_string(),
                "Authentication status: Valid".to_string(),
            ]
        );

        let lines = status_lines(&settings, at(1_700_000_001));
        assert_eq!(lines.last().unwrap(), "Authentication status: Expired");
    }

    #[test]
    fn test_status_opaque_token() {
        let mut settings = Settings::default();
        settings.service.jwt = Some("opaque".into());
        let lines = status_lines(&settings, at(0));
        assert!(lines[0].contains("Unknown"));
    }

    #[test]
    fn test_logout_keeps_client_id() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());
        let mut settings = Settings::default();
        settings.service.client_id = Some("abc".into());
        settings.service.jwt = Some("eyJ.x.y".into());
        store.save(&settings).unwrap();

        logout(&store).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.service.client_id.as_deref(), Some("abc"));
        assert_eq!(loaded.service.jwt, None);
    }

    #[tokio::test]
    async fn test_login_requires_client_id() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path());

        let err = login(None, true, &GlobalArgs::default(), &store)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("client ID is required"));
    }
}
