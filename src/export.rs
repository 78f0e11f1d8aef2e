//! Import and export of the collection as document files.
//!
//! Both directions speak the same schema as the gist backup, so an export
//! can be re-imported here or restored through the gist flow.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::article::Article;
use crate::storage::{PersistenceManager, SaveOutcome, StorageError};
use crate::store::ArticleStore;
use crate::sync::{build_document, parse_document, DocumentError};
use crate::util;

/// SEC-003: Bound on import files, same cap as remote response bodies.
/// The storage quota would reject oversized collections anyway, but
/// checking up front avoids buffering a runaway file.
const MAX_IMPORT_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Import file exceeds {0} bytes")]
    TooLarge(u64),
    #[error("Invalid backup document: {0}")]
    Document(#[from] DocumentError),
    #[error("Could not encode the export document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ImportedBatch {
    pub articles: Vec<Article>,
    /// Entries that were not objects and had to be discarded.
    pub dropped: usize,
}

/// Default export filename, stamped with today's date.
pub fn default_export_name() -> String {
    format!("daybook-export-{}.json", util::date_stamp())
}

/// Writes the full document to `path` atomically. Returns the byte size of
/// the written document.
pub fn export_to_file(
    articles: &[Article],
    last_sync: &str,
    path: &Path,
) -> Result<usize, TransferError> {
    let document = build_document(articles, last_sync)?;
    atomic_write(path, document.as_bytes())?;
    info!(path = %path.display(), count = articles.len(), "Exported collection");
    Ok(document.len())
}

/// Reads and parses an import file. Every imported article gets a freshly
/// generated id, even when the file carries one, so repeated imports can
/// never collide with existing records.
pub fn read_import_file(path: &Path) -> Result<ImportedBatch, TransferError> {
    // Size check is advisory (the file can change before the read); the
    // parse below handles whatever we actually get.
    let size = std::fs::metadata(path)?.len();
    if size > MAX_IMPORT_SIZE {
        return Err(TransferError::TooLarge(MAX_IMPORT_SIZE));
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = parse_document(&content)?;
    if parsed.dropped > 0 {
        warn!(dropped = parsed.dropped, "Discarded unusable entries from import file");
    }

    let mut articles = parsed.articles;
    for article in &mut articles {
        article.id = util::generate_id();
    }
    Ok(ImportedBatch {
        articles,
        dropped: parsed.dropped,
    })
}

/// Replaces the collection with an imported batch and persists it. When the
/// write fails the previous collection is restored, so a bad import never
/// costs existing data.
pub fn apply_import(
    batch: Vec<Article>,
    store: &mut ArticleStore,
    persist: &PersistenceManager,
) -> Result<SaveOutcome, StorageError> {
    let previous = store.to_vec();
    store.replace_all(batch);
    match persist.save(store) {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            store.replace_all(previous);
            Err(error)
        }
    }
}

/// SEC-002: Write to a randomized temp name in the destination directory,
/// sync, then rename over the target so the file is never half-written.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{suffix:016x}"));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
