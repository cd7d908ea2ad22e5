// Reusable persistence layer for DialHub services: audited entities, a
// generic repository over the embedded document store, windowing, search
// filters, and reference population.

pub mod error;
pub mod models;
pub mod pagination;
pub mod populate;
pub mod repositories;
pub mod search;

pub use error::{RepositoryError, Result};
pub use models::{
    AuditFields, DeleteResult, Entity, LabelItem, Pagination, QueryResult,
};
pub use populate::PopulateSpec;
pub use repositories::{GenericRepository, Repository};

pub use dialhub_store::{
    Document, DocumentStore, Filter, FindOptions, SortOrder, Stage, StoreError,
};

pub use chrono;
pub use serde_json;
pub use uuid;
