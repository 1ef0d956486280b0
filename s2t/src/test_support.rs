//! Test-only helpers: an in-memory secret store and prefilled fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::credentials::{Credentials, EphemeralConfig, write_ephemeral_config};
use crate::secrets::SecretStore;
use crate::settings::{DEFAULT_REDIRECT_URI, Settings};

/// In-memory secret store with an optional always-unavailable mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every operation, like a platform without a
    /// keyring daemon.
    pub fn unavailable() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            unavailable: true,
        }
    }
}

impl SecretStore for MemoryStore {
    fn available(&self) -> bool {
        !self.unavailable
    }

    fn get(&self, name: &str) -> Option<String> {
        if self.unavailable {
            return None;
        }
        self.values
            .lock()
            .expect("memory store lock")
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: &str) -> bool {
        if self.unavailable {
            return false;
        }
        let mut values = self.values.lock().expect("memory store lock");
        if value.is_empty() {
            values.remove(name);
        } else {
            values.insert(name.to_string(), value.to_string());
        }
        true
    }

    fn delete(&self, name: &str) -> bool {
        if self.unavailable {
            return false;
        }
        self.values
            .lock()
            .expect("memory store lock")
            .remove(name);
        true
    }
}

/// Settings with every required non-secret field filled in.
pub fn test_settings() -> Settings {
    Settings {
        spotify_client_id: "client-123".to_string(),
        spotify_username: "alice".to_string(),
        tidal_username: "alice@example.com".to_string(),
        ..Settings::default()
    }
}

/// A complete credential set with deterministic placeholder values.
pub fn test_credentials() -> Credentials {
    Credentials {
        client_id: "client-123".to_string(),
        client_secret: "secret-abc".to_string(),
        spotify_username: "alice".to_string(),
        redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        tidal_username: "alice@example.com".to_string(),
        tidal_password: "password-xyz".to_string(),
    }
}

/// A freshly written ephemeral config directory for coordinator tests.
pub fn test_config() -> EphemeralConfig {
    write_ephemeral_config(&test_credentials()).expect("write ephemeral config")
}
