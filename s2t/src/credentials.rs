//! Credential resolution and the ephemeral on-disk config document.
//!
//! The external tool reads `config.yml` from its working directory. That
//! file contains secrets in clear text, so it is written into a fresh
//! temporary directory immediately before each run and deleted as soon as
//! the child exits, whatever the outcome. The directory is never reused
//! across runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::secrets::{SPOTIFY_CLIENT_SECRET, SecretStore, TIDAL_PASSWORD};
use crate::settings::{DEFAULT_REDIRECT_URI, Settings};

/// File name the external tool expects in its working directory.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Clear-text secret values supplied directly by the caller, taking
/// precedence over the secret store.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub client_secret: Option<String>,
    pub tidal_password: Option<String>,
}

/// Fully resolved credential set for one run.
///
/// Holds secrets in memory only; the sole durable form is the ephemeral
/// config document, which lives exactly as long as the child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub spotify_username: String,
    pub redirect_uri: String,
    pub tidal_username: String,
    pub tidal_password: String,
}

impl Credentials {
    /// Merge settings, caller overrides, and secret-store fallbacks into a
    /// complete credential set.
    ///
    /// Any missing required value is a validation error naming the field,
    /// surfaced before anything is spawned or written to disk. Error
    /// messages name fields only, never values.
    pub fn resolve(
        settings: &Settings,
        store: &dyn SecretStore,
        overrides: &CredentialOverrides,
    ) -> Result<Self> {
        let client_id = required(&settings.spotify_client_id, "Spotify client id")?;
        let spotify_username = required(&settings.spotify_username, "Spotify username")?;
        let tidal_username = required(&settings.tidal_username, "TIDAL username")?;

        let client_secret = secret(
            overrides.client_secret.as_deref(),
            store,
            SPOTIFY_CLIENT_SECRET,
            "Spotify client secret",
        )?;
        let tidal_password = secret(
            overrides.tidal_password.as_deref(),
            store,
            TIDAL_PASSWORD,
            "TIDAL password",
        )?;

        let redirect_uri = settings.spotify_redirect_uri.trim();
        let redirect_uri = if redirect_uri.is_empty() {
            DEFAULT_REDIRECT_URI.to_string()
        } else {
            redirect_uri.to_string()
        };

        Ok(Self {
            client_id,
            client_secret,
            spotify_username,
            redirect_uri,
            tidal_username,
            tidal_password,
        })
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("{field} is required");
    }
    Ok(value.to_string())
}

fn secret(
    override_value: Option<&str>,
    store: &dyn SecretStore,
    name: &str,
    field: &str,
) -> Result<String> {
    if let Some(value) = override_value {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
    match store.get(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!("{field} is required (not found in the secret store)"),
    }
}

/// Temporary directory holding exactly one `config.yml` for one run.
///
/// The coordinator takes ownership for the duration of the run and closes
/// it once the child has exited. Drop is the backstop: even on a panic the
/// directory is removed.
#[derive(Debug)]
pub struct EphemeralConfig {
    dir: TempDir,
}

impl EphemeralConfig {
    /// Directory to use as the child's working directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the config document inside the directory.
    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join(CONFIG_FILE_NAME)
    }

    /// Delete the directory and everything in it.
    ///
    /// Failure to delete is reported as a warning only; it never escalates
    /// past the current run.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), err = %err, "could not remove ephemeral config dir");
        } else {
            debug!(path = %path.display(), "ephemeral config dir removed");
        }
    }
}

/// Serialize the credential set into a fresh temporary directory.
///
/// Each run gets its own directory so a previous run's deleted-but-cached
/// secrets can never leak into the next one. Document format matches what
/// the external tool parses: two top-level sections with two-space-indented
/// key-value lines.
pub fn write_ephemeral_config(credentials: &Credentials) -> Result<EphemeralConfig> {
    let dir = tempfile::Builder::new()
        .prefix("s2t-")
        .tempdir()
        .context("create ephemeral config dir")?;

    let content = [
        "spotify:".to_string(),
        format!("  client_id: {}", credentials.client_id),
        format!("  client_secret: {}", credentials.client_secret),
        format!("  username: {}", credentials.spotify_username),
        format!("  redirect_uri: {}", credentials.redirect_uri),
        String::new(),
        "tidal:".to_string(),
        format!("  username: {}", credentials.tidal_username),
        format!("  password: {}", credentials.tidal_password),
        String::new(),
    ]
    .join("\n");

    let config_path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&config_path, content)
        .with_context(|| format!("write {}", config_path.display()))?;
    debug!(path = %dir.path().display(), "ephemeral config written");

    Ok(EphemeralConfig { dir })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStore, test_settings};

    fn full_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.set(SPOTIFY_CLIENT_SECRET, "stored-secret");
        store.set(TIDAL_PASSWORD, "stored-password");
        store
    }

    #[test]
    fn resolve_pulls_secrets_from_store() {
        let credentials = Credentials::resolve(
            &test_settings(),
            &full_store(),
            &CredentialOverrides::default(),
        )
        .expect("resolve");
        assert_eq!(credentials.client_secret, "stored-secret");
        assert_eq!(credentials.tidal_password, "stored-password");
        assert_eq!(credentials.redirect_uri, DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn overrides_take_precedence_over_store() {
        let overrides = CredentialOverrides {
            client_secret: Some("field-secret".to_string()),
            tidal_password: None,
        };
        let credentials =
            Credentials::resolve(&test_settings(), &full_store(), &overrides).expect("resolve");
        assert_eq!(credentials.client_secret, "field-secret");
        assert_eq!(credentials.tidal_password, "stored-password");
    }

    /// Secret store unavailable and no override supplied: validation fails
    /// before anything is spawned or written.
    #[test]
    fn unavailable_store_without_override_fails_validation() {
        let err = Credentials::resolve(
            &test_settings(),
            &MemoryStore::unavailable(),
            &CredentialOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Spotify client secret"));
    }

    #[test]
    fn missing_settings_field_fails_validation() {
        let mut settings = test_settings();
        settings.tidal_username = String::new();
        let err = Credentials::resolve(
            &settings,
            &full_store(),
            &CredentialOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("TIDAL username"));
    }

    #[test]
    fn config_document_has_both_sections() {
        let credentials = Credentials::resolve(
            &test_settings(),
            &full_store(),
            &CredentialOverrides::default(),
        )
        .expect("resolve");
        let config = write_ephemeral_config(&credentials).expect("write");
        let contents = fs::read_to_string(config.config_path()).expect("read");
        let expected = "spotify:\n  client_id: client-123\n  client_secret: stored-secret\n  username: alice\n  redirect_uri: http://127.0.0.1:8888/callback\n\ntidal:\n  username: alice@example.com\n  password: stored-password\n";
        assert_eq!(contents, expected);
        config.close();
    }

    #[test]
    fn close_removes_directory() {
        let credentials = Credentials::resolve(
            &test_settings(),
            &full_store(),
            &CredentialOverrides::default(),
        )
        .expect("resolve");
        let config = write_ephemeral_config(&credentials).expect("write");
        let path = config.path().to_path_buf();
        assert!(path.join(CONFIG_FILE_NAME).exists());
        config.close();
        assert!(!path.exists());
    }

    /// Two runs must never share a directory.
    #[test]
    fn each_run_gets_a_fresh_directory() {
        let credentials = Credentials::resolve(
            &test_settings(),
            &full_store(),
            &CredentialOverrides::default(),
        )
        .expect("resolve");
        let first = write_ephemeral_config(&credentials).expect("write");
        let second = write_ephemeral_config(&credentials).expect("write");
        assert_ne!(first.path(), second.path());
        first.close();
        second.close();
    }
}
