// Embedded document store for DialHub
// Schemaless collections with Mongo-style filters and aggregation pipelines

pub mod collection;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod query;

// Re-export commonly used items
pub use collection::{Collection, FindOptions};
pub use document::Document;
pub use error::{Result, StoreError};
pub use pipeline::{SortOrder, Stage};
pub use query::Filter;

pub use serde_json;
pub use uuid;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use collection::Collections;

/// Handle to the document store. Cheap to clone; all clones share the same
/// backing collections. Collections are created on first write.
#[derive(Clone, Default)]
pub struct DocumentStore {
    collections: Collections,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Handle to a named collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(name.to_string(), Arc::clone(&self.collections))
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        collections.keys().cloned().collect()
    }

    pub async fn drop_collection(&self, name: &str) -> bool {
        let mut collections = self.collections.write().await;
        let dropped = collections.remove(name).is_some();
        if dropped {
            tracing::debug!(collection = %name, "dropped collection");
        }
        dropped
    }
}
