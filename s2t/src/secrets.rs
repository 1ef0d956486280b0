//! Platform secret storage for the two credential values that must never
//! touch the settings document.
//!
//! Every operation degrades to empty/no-op when the backing store is
//! unavailable: a missing keyring means the user supplies the value
//! directly, never a crash.

use keyring::Entry;
use tracing::warn;

/// Fixed keyring service namespace for all launcher entries.
pub const SERVICE_NAME: &str = "s2t";

/// Keyring entry name for the Spotify application client secret.
pub const SPOTIFY_CLIENT_SECRET: &str = "spotify_client_secret";

/// Keyring entry name for the TIDAL account password.
pub const TIDAL_PASSWORD: &str = "tidal_password";

/// Abstraction over the platform secret store.
///
/// Implementations must not panic or error on backing-store
/// unavailability: `get` returns `None`, `set`/`delete` return `false`.
pub trait SecretStore {
    /// Whether the backing store is usable at all. `false` means secrets
    /// must be supplied directly by the caller instead.
    fn available(&self) -> bool;

    /// Fetch a named secret. Absent and unavailable both yield `None`.
    fn get(&self, name: &str) -> Option<String>;

    /// Store a named secret. An empty value deletes the entry. Returns
    /// `false` when the store rejected the write.
    fn set(&self, name: &str, value: &str) -> bool;

    /// Remove a named secret. Removing an absent entry is success.
    fn delete(&self, name: &str) -> bool;
}

/// Secret store backed by the platform keyring.
#[derive(Debug, Default)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(&self, name: &str) -> Option<Entry> {
        match Entry::new(SERVICE_NAME, name) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(name, err = %err, "keyring entry unavailable");
                None
            }
        }
    }
}

impl SecretStore for KeyringStore {
    fn available(&self) -> bool {
        // Probing an entry handle is enough; reads/writes still degrade
        // individually if the daemon goes away later.
        Entry::new(SERVICE_NAME, SPOTIFY_CLIENT_SECRET).is_ok()
    }

    fn get(&self, name: &str) -> Option<String> {
        let entry = self.entry(name)?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                warn!(name, err = %err, "keyring read failed");
                None
            }
        }
    }

    fn set(&self, name: &str, value: &str) -> bool {
        if value.is_empty() {
            return self.delete(name);
        }
        let Some(entry) = self.entry(name) else {
            return false;
        };
        match entry.set_password(value) {
            Ok(()) => true,
            Err(err) => {
                warn!(name, err = %err, "keyring write failed");
                false
            }
        }
    }

    fn delete(&self, name: &str) -> bool {
        let Some(entry) = self.entry(name) else {
            return false;
        };
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => true,
            Err(err) => {
                warn!(name, err = %err, "keyring delete failed");
                false
            }
        }
    }
}
