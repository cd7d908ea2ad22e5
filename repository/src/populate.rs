//! Reference population: replace a stored identity with the referenced
//! document before a result is returned. Pluggable per call; an empty spec
//! slice is a no-op.

use uuid::Uuid;

use dialhub_store::{Document, DocumentStore};

use crate::error::Result;

/// One reference to resolve: the field at `path` holds an identity into the
/// `from` collection.
#[derive(Debug, Clone)]
pub struct PopulateSpec {
    pub path: String,
    pub from: String,
}

impl PopulateSpec {
    pub fn new(path: &str, from: &str) -> Self {
        Self {
            path: path.to_string(),
            from: from.to_string(),
        }
    }
}

/// Resolve every spec against the materialized document. A null, absent, or
/// dangling reference leaves the field as stored.
pub(crate) async fn apply(
    store: &DocumentStore,
    mut doc: Document,
    specs: &[PopulateSpec],
) -> Result<Document> {
    for spec in specs {
        let Some(reference) = doc.get(&spec.path) else {
            continue;
        };
        let Some(id) = reference.as_str().and_then(|s| Uuid::parse_str(s).ok()) else {
            continue;
        };
        match store.collection(&spec.from).find_by_id(id).await? {
            Some(referenced) => doc.set(&spec.path, referenced.into_value()),
            None => {
                tracing::warn!(
                    path = %spec.path,
                    from = %spec.from,
                    %id,
                    "dangling reference left unpopulated"
                );
            }
        }
    }
    Ok(doc)
}
