//! Sync configuration: token, bound gist, auto-sync flag, last sync time.
//!
//! Persisted as one JSON record in the local store and written back after
//! every mutation. A corrupt record degrades to "not configured" with a
//! warning; it never blocks startup.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{LocalStore, StorageError};

pub const SYNC_CONFIG_KEY: &str = "sync_config";

fn default_auto_sync() -> bool {
    true
}

/// SEC-004: custom Debug below masks the token.
#[derive(Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Personal access token with the gist scope. Empty means unconfigured.
    #[serde(default)]
    pub token: Option<String>,

    /// The gist currently bound as the remote document.
    #[serde(default)]
    pub gist_id: Option<String>,

    /// Push automatically after each successful local save.
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// ISO-8601 time of the last successful push or pull.
    #[serde(default)]
    pub last_sync: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            token: None,
            gist_id: None,
            auto_sync: true,
            last_sync: None,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("gist_id", &self.gist_id)
            .field("auto_sync", &self.auto_sync)
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

impl SyncConfig {
    /// Loads the record, treating a missing or corrupt one as defaults.
    pub fn load(store: &LocalStore) -> Self {
        let mut config = match store.get(SYNC_CONFIG_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<SyncConfig>(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "Corrupt sync configuration, starting unconfigured");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "Could not read sync configuration, starting unconfigured");
                Self::default()
            }
        };
        config.tidy();
        config
    }

    /// Persists the record. Call after every mutation.
    pub fn save(&self, store: &LocalStore) -> Result<(), StorageError> {
        let mut copy = self.clone();
        copy.tidy();
        store.set(SYNC_CONFIG_KEY, &serde_json::to_string(&copy)?)
    }

    /// Removes the stored record entirely.
    pub fn clear(store: &LocalStore) -> Result<(), StorageError> {
        store.remove(SYNC_CONFIG_KEY)
    }

    /// Empty strings mean "unset" wherever they came from.
    fn tidy(&mut self) {
        if self.token.as_deref() == Some("") {
            self.token = None;
        }
        if self.gist_id.as_deref() == Some("") {
            self.gist_id = None;
        }
        if self.last_sync.as_deref() == Some("") {
            self.last_sync = None;
        }
    }

    /// A token is the precondition for any remote operation.
    pub fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Auto-sync fires only with a token, a bound gist, and the flag on.
    pub fn auto_sync_ready(&self) -> bool {
        self.is_configured() && self.gist_id.is_some() && self.auto_sync
    }

    /// The token as a secrecy handle for client construction.
    pub fn token_secret(&self) -> Option<SecretString> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
    }
}
