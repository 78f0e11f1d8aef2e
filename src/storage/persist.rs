//! Article persistence over the local store: mirrored slots, corruption
//! recovery, and the quota reclamation cascade.
//!
//! Records are written as a versioned envelope `{"schema":1,"articles":[..]}`;
//! a bare JSON array is still accepted on read as the legacy layout. The
//! backup slot is a same-generation mirror of the primary: it protects
//! against a torn or lost primary write, not against logical corruption
//! that was faithfully mirrored.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::article::{self, Article};
use crate::store::ArticleStore;
use crate::storage::local::{LocalStore, StorageError};
use crate::util::parse_when;

pub const PRIMARY_KEY: &str = "articles_primary";
pub const BACKUP_KEY: &str = "articles_backup";

/// Envelope schema version for the article slots.
const SCHEMA_VERSION: u32 = 1;

/// Images are kept on this many of the newest articles when the cascade
/// strips the rest.
pub const KEEP_IMAGES: usize = 10;
/// The truncation stage keeps this many of the most recent articles.
pub const TRUNCATE_KEEP: usize = 20;

#[derive(Serialize)]
struct Envelope<'a> {
    schema: u32,
    articles: &'a [Article],
}

/// Where a load ultimately got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    Sample,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub articles: Vec<Article>,
    pub source: LoadSource,
    /// Records discarded by per-record validation on the slot that won.
    pub dropped: usize,
}

/// One applied stage of the reclamation cascade, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimStage {
    StripImages,
    Truncate,
    Reset,
}

impl fmt::Display for ReclaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReclaimStage::StripImages => write!(f, "strip-images"),
            ReclaimStage::Truncate => write!(f, "truncate"),
            ReclaimStage::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SaveOutcome {
    /// Serialized size of the generation that was finally written.
    pub bytes: usize,
    /// The serialized collection crossed 90% of the storage budget.
    pub near_capacity: bool,
    /// Ids regenerated by normalization (empty or duplicate).
    pub regenerated_ids: usize,
    /// Cascade stages applied, in order; empty for a clean save.
    pub stages: Vec<ReclaimStage>,
}

impl SaveOutcome {
    /// True when the save only succeeded by discarding data.
    pub fn degraded(&self) -> bool {
        !self.stages.is_empty()
    }
}

/// Why a slot could not be used. Missing is the expected first-run case;
/// everything else is corruption worth a warning.
#[derive(Debug, Error)]
enum SlotError {
    #[error("slot missing")]
    Missing,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not an article collection")]
    NotACollection,
    #[error("no usable records")]
    Empty,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SlotError {
    fn is_corruption(&self) -> bool {
        !matches!(self, SlotError::Missing)
    }
}

pub struct PersistenceManager {
    store: LocalStore,
}

impl PersistenceManager {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// The underlying key-value store; sync configuration and the usage
    /// scalars share it with the article slots.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Loads the collection, never failing: primary slot, then backup, then
    /// built-in samples. Backup and sample results are written back so the
    /// primary heals.
    pub fn load(&self) -> LoadOutcome {
        match self.read_slot(PRIMARY_KEY) {
            Ok((articles, dropped)) => {
                if dropped > 0 {
                    warn!(dropped, "Dropped invalid records from primary slot");
                }
                debug!(articles = articles.len(), "Loaded articles from primary slot");
                return LoadOutcome {
                    articles,
                    source: LoadSource::Primary,
                    dropped,
                };
            }
            Err(e) if e.is_corruption() => {
                warn!(slot = PRIMARY_KEY, error = %e, "Primary slot unusable, trying backup");
            }
            Err(_) => debug!(slot = PRIMARY_KEY, "Slot absent"),
        }

        match self.read_slot(BACKUP_KEY) {
            Ok((articles, dropped)) => {
                if dropped > 0 {
                    warn!(dropped, "Dropped invalid records from backup slot");
                }
                info!(
                    articles = articles.len(),
                    "Recovered articles from backup slot"
                );
                self.heal(&articles);
                return LoadOutcome {
                    articles,
                    source: LoadSource::Backup,
                    dropped,
                };
            }
            Err(e) if e.is_corruption() => {
                warn!(slot = BACKUP_KEY, error = %e, "Backup slot unusable");
            }
            Err(_) => debug!(slot = BACKUP_KEY, "Slot absent"),
        }

        let samples = article::sample_articles();
        info!(
            articles = samples.len(),
            "Initializing article store with sample content"
        );
        self.heal(&samples);
        LoadOutcome {
            articles: samples,
            source: LoadSource::Sample,
            dropped: 0,
        }
    }

    /// Saves the collection to both slots, normalizing it in place first.
    ///
    /// A quota refusal triggers the reclamation cascade: strip images beyond
    /// the [`KEEP_IMAGES`] newest, then truncate to the [`TRUNCATE_KEEP`]
    /// most recent by date (the re-sort persists), then reset the entire
    /// store to sample content. Each stage is retried at most once and only
    /// runs if the previous retry still hit quota. Applied stages are
    /// returned in the outcome.
    ///
    /// On `Err` nothing was persisted; the in-memory collection may still
    /// have been degraded by cascade stages, so callers should reload rather
    /// than retry blindly.
    pub fn save(&self, store: &mut ArticleStore) -> Result<SaveOutcome, StorageError> {
        let mut outcome = SaveOutcome {
            regenerated_ids: store.normalize(),
            ..SaveOutcome::default()
        };
        if outcome.regenerated_ids > 0 {
            debug!(
                regenerated = outcome.regenerated_ids,
                "Normalization regenerated article ids"
            );
        }

        let json = self.encode(store.as_slice())?;

        // Advisory only, measured against one slot's share of the budget
        // (the generation is stored twice); the write is still attempted
        let slot_share = self.store.budget() / 2;
        if json.len().saturating_mul(10) > slot_share.saturating_mul(9) {
            warn!(
                bytes = json.len(),
                slot_share,
                "Serialized articles exceed 90% of the storage budget"
            );
            outcome.near_capacity = true;
        }

        match self.write_slots(&json) {
            Ok(()) => {
                outcome.bytes = json.len();
                debug!(bytes = json.len(), articles = store.len(), "Articles saved");
                return Ok(outcome);
            }
            Err(e) if e.is_quota() => {
                warn!(error = %e, "Storage budget exceeded, reclaiming space");
            }
            Err(e) => return Err(e),
        }

        // Stage 1: strip images beyond the newest few
        let cleared = Self::strip_images(store);
        outcome.stages.push(ReclaimStage::StripImages);
        warn!(stage = %ReclaimStage::StripImages, cleared, "Applying reclamation stage");
        let json = self.encode(store.as_slice())?;
        match self.write_slots(&json) {
            Ok(()) => {
                outcome.bytes = json.len();
                return Ok(outcome);
            }
            Err(e) if e.is_quota() => {}
            Err(e) => return Err(e),
        }

        // Stage 2: keep only the most recent articles. The date sort is
        // observable afterwards; skipped entirely at or below the threshold.
        if store.len() > TRUNCATE_KEEP {
            let articles = store.articles_mut();
            articles.sort_by_cached_key(|a| std::cmp::Reverse(parse_when(&a.date)));
            articles.truncate(TRUNCATE_KEEP);
            outcome.stages.push(ReclaimStage::Truncate);
            warn!(
                stage = %ReclaimStage::Truncate,
                kept = TRUNCATE_KEEP,
                "Applying reclamation stage"
            );
            let json = self.encode(store.as_slice())?;
            match self.write_slots(&json) {
                Ok(()) => {
                    outcome.bytes = json.len();
                    return Ok(outcome);
                }
                Err(e) if e.is_quota() => {}
                Err(e) => return Err(e),
            }
        }

        // Stage 3: last resort, wipe the whole store and start over with
        // sample content. Takes the sync configuration and preferences with
        // it, exactly like clearing the store by hand.
        warn!(stage = %ReclaimStage::Reset, "Applying reclamation stage");
        self.store.clear()?;
        store.replace_all(article::sample_articles());
        outcome.stages.push(ReclaimStage::Reset);
        let json = self.encode(store.as_slice())?;
        self.write_slots(&json)?;
        outcome.bytes = json.len();
        Ok(outcome)
    }

    fn strip_images(store: &mut ArticleStore) -> usize {
        let mut cleared = 0;
        for (idx, article) in store.articles_mut().iter_mut().enumerate() {
            if idx >= KEEP_IMAGES && !article.image.is_empty() {
                article.image.clear();
                cleared += 1;
            }
        }
        cleared
    }

    fn encode(&self, articles: &[Article]) -> Result<String, StorageError> {
        Ok(serde_json::to_string(&Envelope {
            schema: SCHEMA_VERSION,
            articles,
        })?)
    }

    /// Primary first, then the mirror; a failure in either is the caller's
    /// quota signal.
    fn write_slots(&self, json: &str) -> Result<(), StorageError> {
        self.store.set(PRIMARY_KEY, json)?;
        self.store.set(BACKUP_KEY, json)
    }

    /// Best-effort write-back after recovering from backup or samples.
    fn heal(&self, articles: &[Article]) {
        match self.encode(articles) {
            Ok(json) => {
                if let Err(e) = self.write_slots(&json) {
                    warn!(error = %e, "Could not write recovered articles back");
                }
            }
            Err(e) => warn!(error = %e, "Could not serialize recovered articles"),
        }
    }

    fn read_slot(&self, key: &str) -> Result<(Vec<Article>, usize), SlotError> {
        let raw = self.store.get(key)?.ok_or(SlotError::Missing)?;
        let value: Value = serde_json::from_str(&raw)?;

        let entries = match &value {
            Value::Array(entries) => entries.as_slice(),
            Value::Object(map) => match map.get("articles") {
                Some(Value::Array(entries)) => entries.as_slice(),
                _ => return Err(SlotError::NotACollection),
            },
            _ => return Err(SlotError::NotACollection),
        };

        let mut articles = Vec::with_capacity(entries.len());
        let mut dropped = 0;
        for entry in entries {
            match article::validate_record(entry) {
                Ok(article) => articles.push(article),
                Err(e) => {
                    dropped += 1;
                    debug!(slot = key, error = %e, "Dropping invalid record");
                }
            }
        }
        if articles.is_empty() {
            return Err(SlotError::Empty);
        }
        Ok((articles, dropped))
    }
}
