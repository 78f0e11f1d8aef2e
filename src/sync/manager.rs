//! Orchestrates backup and restore against the bound gist.
//!
//! Every operation needs a saved token before any network call is made.
//! Restore never merges: the remote collection wholesale replaces the local
//! one, and only after the incoming data has been persisted.

use std::cmp::Reverse;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::storage::{LocalStore, PersistenceManager, StorageError};
use crate::store::ArticleStore;
use crate::sync::config::SyncConfig;
use crate::sync::gist::{ApiError, Gist, GistClient};
use crate::sync::payload::{self, DocumentError, ParsedDocument};
use crate::sync::GIST_FILENAME;
use crate::util;

/// Local collections larger than this are assumed to hold real writing, and
/// startup restore leaves them alone.
pub const STARTUP_LOCAL_LIMIT: usize = 2;

const CREATE_DESCRIPTION: &str = "Daybook - personal article backup";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync is not configured (no token saved)")]
    NotConfigured,
    #[error("No backup gist is bound (run `sync now` or `sync setup`)")]
    NoGist,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Backup document is invalid: {0}")]
    Document(#[from] DocumentError),
    #[error("Could not encode the backup document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("The gist has no {file} file", file = GIST_FILENAME)]
    MissingFile,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct PushReport {
    pub gist_id: String,
    pub articles: usize,
    /// A fresh gist was created during this push.
    pub created: bool,
    /// An existing backup gist was discovered and bound during this push.
    pub adopted: bool,
}

#[derive(Debug, Clone)]
pub struct PullReport {
    pub count: usize,
    /// Remote entries that were not objects and had to be discarded.
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub enum StartupLoad {
    Replaced { count: usize, dropped: usize },
    KeptLocal { local: usize },
    RemoteEmpty,
}

#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub login: String,
    pub gist_verified: Option<bool>,
    /// The bound gist stopped verifying and the binding was cleared.
    pub unbound: bool,
}

pub struct SyncManager {
    client: GistClient,
}

impl SyncManager {
    /// Fails without touching the network when no token is saved.
    pub fn new(config: &SyncConfig, base_url: Option<&str>) -> Result<Self, SyncError> {
        let token = config.token_secret().ok_or(SyncError::NotConfigured)?;
        let client = GistClient::new(token, base_url)?;
        Ok(Self { client })
    }

    /// True when the gist is still reachable. Transport failures count as
    /// not verified so push falls back to creating a fresh gist.
    pub async fn verify(&self, gist_id: &str) -> bool {
        match self.client.get_gist(gist_id).await {
            Ok(_) => true,
            Err(error) => {
                debug!(gist_id = %gist_id, error = %error, "Gist did not verify");
                false
            }
        }
    }

    /// Whether the gist carries the distinguished backup file. Callers warn
    /// on false but may still bind the gist.
    pub async fn is_own_document(&self, gist_id: &str) -> Result<bool, SyncError> {
        let gist = self.client.get_gist(gist_id).await?;
        Ok(gist.files.contains_key(GIST_FILENAME))
    }

    /// Every gist reachable with the token that carries the backup file,
    /// most recently updated first.
    pub async fn discover(&self) -> Result<Vec<Gist>, SyncError> {
        let mut matches: Vec<Gist> = self
            .client
            .list_gists()
            .await?
            .into_iter()
            .filter(|gist| gist.files.contains_key(GIST_FILENAME))
            .collect();
        matches.sort_by_cached_key(|gist| {
            Reverse(util::parse_when(gist.updated_at.as_deref().unwrap_or_default()))
        });
        debug!(count = matches.len(), "Discovered backup gists");
        Ok(matches)
    }

    async fn fetch_document(&self, gist_id: &str) -> Result<ParsedDocument, SyncError> {
        let gist = self.client.get_gist(gist_id).await?;
        let content = self
            .client
            .file_content(&gist, GIST_FILENAME)
            .await?
            .ok_or(SyncError::MissingFile)?;
        Ok(payload::parse_document(&content)?)
    }

    /// Persists the incoming collection and only then swaps it into memory,
    /// so a failed write leaves both store and memory untouched.
    fn apply_remote(
        &self,
        articles: Vec<Article>,
        store: &mut ArticleStore,
        persist: &PersistenceManager,
        config: &mut SyncConfig,
    ) -> Result<usize, SyncError> {
        let mut incoming = ArticleStore::from_vec(articles);
        let outcome = persist.save(&mut incoming)?;
        if outcome.degraded() {
            warn!(
                stages = ?outcome.stages,
                "Restored collection only fit after reclaiming space"
            );
        }
        let count = incoming.len();
        store.replace_all(incoming.into_vec());
        config.last_sync = Some(util::now_iso());
        config.save(persist.store())?;
        Ok(count)
    }

    /// Replaces the local collection with the gist's contents. No merge.
    pub async fn pull_from(
        &self,
        gist_id: &str,
        store: &mut ArticleStore,
        persist: &PersistenceManager,
        config: &mut SyncConfig,
    ) -> Result<PullReport, SyncError> {
        let parsed = self.fetch_document(gist_id).await?;
        if parsed.dropped > 0 {
            warn!(
                dropped = parsed.dropped,
                "Discarded unusable entries from the remote document"
            );
        }
        let dropped = parsed.dropped;
        let count = self.apply_remote(parsed.articles, store, persist, config)?;
        info!(count, gist_id = %gist_id, "Replaced local collection from gist");
        Ok(PullReport { count, dropped })
    }

    /// Startup restore from the bound gist. Refuses (before any network
    /// call) when the local collection holds more than
    /// [`STARTUP_LOCAL_LIMIT`] records, and refuses to replace local data
    /// with an empty remote collection.
    pub async fn load_on_startup(
        &self,
        store: &mut ArticleStore,
        persist: &PersistenceManager,
        config: &mut SyncConfig,
    ) -> Result<StartupLoad, SyncError> {
        if store.len() > STARTUP_LOCAL_LIMIT {
            debug!(local = store.len(), "Local collection has real data, skipping startup restore");
            return Ok(StartupLoad::KeptLocal { local: store.len() });
        }
        let gist_id = config.gist_id.clone().ok_or(SyncError::NoGist)?;
        let parsed = self.fetch_document(&gist_id).await?;
        if parsed.articles.is_empty() {
            info!("Remote backup is empty, keeping local collection");
            return Ok(StartupLoad::RemoteEmpty);
        }
        let dropped = parsed.dropped;
        let count = self.apply_remote(parsed.articles, store, persist, config)?;
        info!(count, "Restored collection from gist on startup");
        Ok(StartupLoad::Replaced { count, dropped })
    }

    /// Uploads the full collection. Binds a gist first when needed: a bound
    /// gist that no longer verifies is replaced, an unbound manager adopts
    /// the newest discovered backup, and failing that a fresh gist is
    /// created.
    pub async fn push(
        &self,
        articles: &[Article],
        config: &mut SyncConfig,
        local: &LocalStore,
    ) -> Result<PushReport, SyncError> {
        let mut adopted = false;
        let bound = match config.gist_id.clone() {
            Some(id) => {
                if self.verify(&id).await {
                    Some(id)
                } else {
                    warn!(gist_id = %id, "Bound gist no longer verifies, creating a replacement");
                    None
                }
            }
            None => match self.discover().await?.into_iter().next() {
                Some(gist) => {
                    info!(gist_id = %gist.id, "Adopting existing backup gist");
                    adopted = true;
                    Some(gist.id)
                }
                None => None,
            },
        };

        let Some(id) = bound else {
            return self.create_new(articles, config, local).await;
        };

        let stamp = util::now_iso();
        let document = payload::build_document(articles, &stamp)?;
        let description = format!(
            "Daybook - {} articles - last sync {}",
            articles.len(),
            util::date_stamp()
        );
        self.client
            .update_gist(&id, &description, GIST_FILENAME, &document)
            .await?;

        config.gist_id = Some(id.clone());
        config.last_sync = Some(stamp);
        config.save(local)?;
        info!(gist_id = %id, count = articles.len(), "Pushed collection to gist");
        Ok(PushReport {
            gist_id: id,
            articles: articles.len(),
            created: false,
            adopted,
        })
    }

    /// Creates a fresh secret gist holding the collection and binds it.
    pub async fn create_new(
        &self,
        articles: &[Article],
        config: &mut SyncConfig,
        local: &LocalStore,
    ) -> Result<PushReport, SyncError> {
        let stamp = util::now_iso();
        let document = payload::build_document(articles, &stamp)?;
        let gist = self
            .client
            .create_gist(CREATE_DESCRIPTION, false, GIST_FILENAME, &document)
            .await?;

        config.gist_id = Some(gist.id.clone());
        config.last_sync = Some(stamp);
        config.save(local)?;
        info!(gist_id = %gist.id, count = articles.len(), "Created backup gist");
        Ok(PushReport {
            gist_id: gist.id,
            articles: articles.len(),
            created: true,
            adopted: false,
        })
    }

    /// Confirms the token works. A bound gist that stopped verifying is
    /// unbound and the change persisted.
    pub async fn test_connection(
        &self,
        config: &mut SyncConfig,
        local: &LocalStore,
    ) -> Result<ConnectionReport, SyncError> {
        let user = self.client.get_user().await?;
        let mut gist_verified = None;
        let mut unbound = false;
        if let Some(id) = config.gist_id.clone() {
            let ok = self.verify(&id).await;
            gist_verified = Some(ok);
            if !ok {
                warn!(gist_id = %id, "Unbinding gist that no longer verifies");
                config.gist_id = None;
                config.save(local)?;
                unbound = true;
            }
        }
        Ok(ConnectionReport {
            login: user.login,
            gist_verified,
            unbound,
        })
    }
}
