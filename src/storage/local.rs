//! Durable key→string store with a hard byte budget.
//!
//! One file per key under `<root>/`, written atomically. `set` refuses any
//! write that would push the total stored bytes past the budget, reporting a
//! quota error without touching the old value; the persistence layer turns
//! that refusal into its reclamation cascade. The budget is fixed at open
//! time, with [`LocalStore::with_budget`] as the test seam.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Total byte budget across every key, primary and backup slots included.
pub const STORAGE_BUDGET: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage budget exceeded: write needs {needed} bytes of a {budget} byte budget")]
    QuotaExceeded { needed: usize, budget: usize },
    #[error("invalid storage key '{0}' (lowercase letters, digits and underscores only)")]
    InvalidKey(String),
    #[error("could not serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// True for the one failure the reclamation cascade can do something
    /// about. Everything else propagates.
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Handle to a store directory. Cloning shares the same root and budget, so
/// background tasks can carry their own handle.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    budget: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct StorageUsage {
    pub used: usize,
    pub budget: usize,
}

impl StorageUsage {
    pub fn percent(&self) -> f64 {
        if self.budget == 0 {
            return 100.0;
        }
        (self.used as f64 / self.budget as f64) * 100.0
    }
}

impl LocalStore {
    /// Opens (creating if needed) a store with the default budget.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::with_budget(root, STORAGE_BUDGET)
    }

    /// Opens a store with an explicit budget. Tests use small budgets to
    /// exercise quota handling without megabytes of fixture data.
    pub fn with_budget(root: impl Into<PathBuf>, budget: usize) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        // SEC-001: store contents are private to the user (the sync token
        // lives here too)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            match fs::metadata(&root) {
                Ok(metadata) => {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o700);
                    if let Err(e) = fs::set_permissions(&root, perms) {
                        tracing::warn!(
                            path = %root.display(),
                            error = %e,
                            "Failed to set store directory permissions to 0700"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %root.display(),
                        error = %e,
                        "Failed to read store directory metadata"
                    );
                }
            }
        }

        Ok(Self { root, budget })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    /// Reads a value. Missing keys are `Ok(None)`, not an error.
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a value, enforcing the budget first. On a quota refusal the
    /// previous value (if any) is untouched.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        let existing = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let needed = self
            .total_bytes()?
            .saturating_sub(existing)
            .saturating_add(value.len());
        if needed > self.budget {
            tracing::debug!(
                key,
                needed,
                budget = self.budget,
                "Refusing write over storage budget"
            );
            return Err(StorageError::QuotaExceeded {
                needed,
                budget: self.budget,
            });
        }

        self.atomic_write(&path, value.as_bytes())?;
        Ok(())
    }

    /// Removes a key. Missing keys are a no-op.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every key (and any stale temp files) from the store.
    pub fn clear(&self) -> Result<(), StorageError> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn usage(&self) -> Result<StorageUsage, StorageError> {
        Ok(StorageUsage {
            used: self.total_bytes()?,
            budget: self.budget,
        })
    }

    fn total_bytes(&self) -> Result<usize, StorageError> {
        let mut total = 0usize;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && entry.file_type()?.is_file() {
                total = total.saturating_add(entry.metadata()?.len() as usize);
            }
        }
        Ok(total)
    }

    /// Write-to-temp-then-rename so a crash mid-write never leaves a torn
    /// value behind.
    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        // SEC-002: randomized temp filename so the temp path cannot be
        // predicted and pre-created as a symlink
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{random_suffix:016x}"));

        let mut temp_file = OpenOptions::new()
            .write(true)
            .create_new(true) // fails atomically if the file exists
            .open(&temp_path)?;

        if let Err(e) = temp_file.write_all(bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        // Sync before rename so the rename never publishes unwritten data
        if let Err(e) = temp_file.sync_all() {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        drop(temp_file);

        // On Windows, rename fails if the destination exists
        #[cfg(windows)]
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                let _ = fs::remove_file(&temp_path);
                return Err(e.into());
            }
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}
