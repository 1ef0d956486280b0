//! Persistent non-secret settings stored under the per-user config dir.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Redirect URI default. 127.0.0.1 rather than localhost, per upstream
/// `spotify_to_tidal` guidance.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Default leading subcommand for the custom action.
pub const DEFAULT_SUBCOMMAND: &str = "sync";

/// Non-secret launcher settings (JSON).
///
/// Persisted whole-document on every save; there is no schema version and
/// absent keys default silently. Secrets live in the platform keyring, never
/// here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Spotify application client id.
    pub spotify_client_id: String,

    /// Spotify account username.
    pub spotify_username: String,

    /// OAuth redirect URI passed through to the external tool.
    pub spotify_redirect_uri: String,

    /// TIDAL account email or username.
    pub tidal_username: String,

    /// Last playlist URL used, restored as the default for the next run.
    pub last_playlist_url: String,

    /// Subcommand used when the custom action leaves it blank.
    pub default_subcommand: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spotify_client_id: String::new(),
            spotify_username: String::new(),
            spotify_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            tidal_username: String::new(),
            last_playlist_url: String::new(),
            default_subcommand: DEFAULT_SUBCOMMAND.to_string(),
        }
    }
}

/// Per-user settings path: `<config dir>/s2t/settings.json`.
///
/// `None` when the platform exposes no config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("s2t").join("settings.json"))
}

/// Load settings from a JSON file.
///
/// Missing, unreadable, or corrupt files all fall back to
/// `Settings::default()`; a corrupt document is reported as a warning, not
/// an error, so a damaged file can never block a run.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Settings::default();
    }
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable settings file, using defaults");
            return Settings::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "corrupt settings file, using defaults");
            Settings::default()
        }
    }
}

/// Atomically write settings to disk (temp file + rename).
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(settings).context("serialize settings json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("missing.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.spotify_redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(settings.default_subcommand, "sync");
    }

    #[test]
    fn load_corrupt_returns_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{not valid json").expect("write");
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("settings.json");
        let settings = Settings {
            spotify_client_id: "client-123".to_string(),
            spotify_username: "alice".to_string(),
            tidal_username: "alice@example.com".to_string(),
            last_playlist_url: "https://open.spotify.com/playlist/abc".to_string(),
            ..Settings::default()
        };
        save_settings(&path, &settings).expect("save");
        assert_eq!(load_settings(&path), settings);
    }

    /// Absent keys in an older document default silently instead of failing.
    #[test]
    fn partial_document_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{\"spotify_client_id\": \"only-this\"}\n").expect("write");
        let settings = load_settings(&path);
        assert_eq!(settings.spotify_client_id, "only-this");
        assert_eq!(settings.spotify_redirect_uri, DEFAULT_REDIRECT_URI);
    }
}
