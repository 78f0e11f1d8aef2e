mod local;
mod persist;

pub use local::{LocalStore, StorageError, StorageUsage, STORAGE_BUDGET};
pub use persist::{
    LoadOutcome, LoadSource, PersistenceManager, ReclaimStage, SaveOutcome, BACKUP_KEY,
    KEEP_IMAGES, PRIMARY_KEY, TRUNCATE_KEEP,
};
