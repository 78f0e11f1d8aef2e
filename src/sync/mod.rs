//! Gist-backed remote sync.
//!
//! The remote document is one distinguished file inside a secret GitHub
//! gist, holding the entire collection. Sync never merges: push overwrites
//! the remote document wholesale, pull and startup restore overwrite the
//! local collection wholesale.

mod auto;
mod config;
mod gist;
mod manager;
mod payload;

pub use auto::AutoSync;
pub use config::{SyncConfig, SYNC_CONFIG_KEY};
pub use gist::{ApiError, Gist, GistClient, GistFile, User};
pub use manager::{
    ConnectionReport, PullReport, PushReport, StartupLoad, SyncError, SyncManager,
    STARTUP_LOCAL_LIMIT,
};
pub use payload::{build_document, parse_document, DocumentError, ParsedDocument};

/// Name of the distinguished file inside the backup gist. Discovery and
/// adoption key off this name.
pub const GIST_FILENAME: &str = "daybook-articles.json";

/// Identifier embedded in every document so other tooling can recognize a
/// Daybook backup.
pub const APP_IDENTIFIER: &str = "daybook-app-v1";
