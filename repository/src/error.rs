use thiserror::Error;

use dialhub_store::StoreError;

/// Repository-level failures.
///
/// Read-path absence is never an error: lookups return `Option`/empty
/// collections. `NotFound` is reserved for `update`, whose callers expect the
/// materialized result back. Driver failures propagate unchanged except during
/// `delete_by_filter`, where silent partial bulk deletion is unacceptable and
/// the cause is wrapped.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("no document matched the update target")]
    NotFound,
    #[error("bulk delete failed: {0}")]
    BulkDeleteFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("entity serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
