use thiserror::Error;
use uuid::Uuid;

/// Driver-level failures surfaced by the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid document identifier: {0}")]
    InvalidId(String),
    #[error("duplicate document identifier: {0}")]
    DuplicateId(Uuid),
    #[error("document is not a JSON object: {0}")]
    InvalidDocument(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid pipeline stage: {0}")]
    InvalidStage(String),
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
