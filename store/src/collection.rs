use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{value_id, Document};
use crate::error::{Result, StoreError};
use crate::pipeline::{self, SortOrder, Stage};
use crate::query::{self, Filter};

/// Shared backing storage: collection name to documents in insertion order.
pub(crate) type Collections = Arc<RwLock<HashMap<String, Vec<Value>>>>;

/// Options for unaggregated finds.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Handle to a named collection. Collections come into existence on first
/// write; reading a collection that was never written is an empty result, not
/// an error.
#[derive(Clone)]
pub struct Collection {
    name: String,
    collections: Collections,
}

impl Collection {
    pub(crate) fn new(name: String, collections: Collections) -> Self {
        Self { name, collections }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert one document. Assigns a fresh identity when `id` is absent,
    /// null, or nil; rejects malformed and duplicate identities.
    pub async fn insert_one(&self, mut doc: Document) -> Result<Document> {
        let id = match doc.get("id") {
            None | Some(Value::Null) => {
                let id = Uuid::new_v4();
                doc.set("id", json!(id));
                id
            }
            Some(Value::String(s)) => {
                let parsed =
                    Uuid::parse_str(s).map_err(|_| StoreError::InvalidId(s.clone()))?;
                if parsed.is_nil() {
                    let id = Uuid::new_v4();
                    doc.set("id", json!(id));
                    id
                } else {
                    parsed
                }
            }
            Some(other) => return Err(StoreError::InvalidId(other.to_string())),
        };

        let mut collections = self.collections.write().await;
        let docs = collections.entry(self.name.clone()).or_default();
        if docs.iter().any(|d| value_id(d) == Some(id)) {
            return Err(StoreError::DuplicateId(id));
        }
        docs.push(doc.to_value());
        tracing::debug!(collection = %self.name, %id, "inserted document");
        Ok(doc)
    }

    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let docs = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);

        let mut rows = Vec::new();
        for doc in docs {
            if query::matches(filter, doc)? {
                rows.push(doc.clone());
            }
        }
        drop(collections);

        let mut stages = Vec::new();
        if let Some((field, order)) = &options.sort {
            stages.push(Stage::Sort {
                field: field.clone(),
                order: *order,
            });
        }
        if let Some(skip) = options.skip {
            stages.push(Stage::Skip(skip));
        }
        if let Some(limit) = options.limit {
            stages.push(Stage::Limit(limit));
        }
        let rows = pipeline::run(&stages, rows)?;

        rows.into_iter().map(Document::from_value).collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        let docs = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        for doc in docs {
            if query::matches(filter, doc)? {
                return Ok(Some(Document::from_value(doc.clone())?));
            }
        }
        Ok(None)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        let docs = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        for doc in docs {
            if value_id(doc) == Some(id) {
                return Ok(Some(Document::from_value(doc.clone())?));
            }
        }
        Ok(None)
    }

    /// `$set`-style merge of `patch` into the first match. Returns the updated
    /// snapshot, or `None` when nothing matched.
    pub async fn update_one(&self, filter: &Filter, patch: &Document) -> Result<Option<Document>> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(self.name.clone()).or_default();

        let mut target = None;
        for (index, doc) in docs.iter().enumerate() {
            if query::matches(filter, doc)? {
                target = Some(index);
                break;
            }
        }
        let Some(index) = target else {
            return Ok(None);
        };

        if let Value::Object(map) = &mut docs[index] {
            for (key, value) in patch.iter() {
                map.insert(key.clone(), value.clone());
            }
        }
        tracing::debug!(collection = %self.name, "updated document");
        Ok(Some(Document::from_value(docs[index].clone())?))
    }

    /// Permanent removal by identity. Returns the removed snapshot.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(self.name.clone()).or_default();
        let position = docs.iter().position(|d| value_id(d) == Some(id));
        match position {
            Some(index) => {
                let removed = docs.remove(index);
                tracing::debug!(collection = %self.name, %id, "hard-deleted document");
                Ok(Some(Document::from_value(removed)?))
            }
            None => Ok(None),
        }
    }

    /// Permanent removal of every document whose identity is in `ids`.
    /// The returned count reflects actual removals.
    pub async fn delete_many_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(self.name.clone()).or_default();
        let before = docs.len();
        docs.retain(|d| !value_id(d).is_some_and(|id| ids.contains(&id)));
        let removed = (before - docs.len()) as u64;
        tracing::debug!(collection = %self.name, removed, "bulk hard delete");
        Ok(removed)
    }

    /// Permanent removal of every match. The filter is evaluated in full
    /// before any document is touched, so a malformed filter removes nothing.
    pub async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(self.name.clone()).or_default();

        let mut keep = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            keep.push(!query::matches(filter, doc)?);
        }
        let before = docs.len();
        let mut flags = keep.into_iter();
        docs.retain(|_| flags.next().unwrap_or(true));
        let removed = (before - docs.len()) as u64;
        tracing::debug!(collection = %self.name, removed, "deleted documents by filter");
        Ok(removed)
    }

    /// Run an aggregation pipeline over the collection in one round trip.
    pub async fn aggregate(&self, stages: &[Stage]) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(&self.name)
            .cloned()
            .unwrap_or_default();
        drop(collections);
        pipeline::run(stages, docs)
    }

    pub async fn count_documents(&self, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        let docs = collections.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        let mut count = 0u64;
        for doc in docs {
            if query::matches(filter, doc)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        let collections = self.collections.read().await;
        collections.get(&self.name).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentStore;
    use serde_json::json;

    fn doc(pairs: Value) -> Document {
        Document::from_value(pairs).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_identity() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");

        let stored = leads
            .insert_one(doc(json!({"first_name": "John"})))
            .await
            .unwrap();
        assert!(stored.id().is_some());
        assert_eq!(leads.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_identity() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        let id = Uuid::new_v4();

        leads
            .insert_one(doc(json!({"id": id, "first_name": "John"})))
            .await
            .unwrap();
        let result = leads.insert_one(doc(json!({"id": id}))).await;
        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn test_insert_rejects_malformed_identity() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        let result = leads.insert_one(doc(json!({"id": "not-a-uuid"}))).await;
        assert!(matches!(result, Err(StoreError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_update_one_merges_patch() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        let stored = leads
            .insert_one(doc(json!({"first_name": "John", "status": "new"})))
            .await
            .unwrap();

        let updated = leads
            .update_one(
                &json!({"id": stored.id()}),
                &doc(json!({"status": "contacted"})),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_str("status"), Some("contacted"));
        assert_eq!(updated.get_str("first_name"), Some("John"));
    }

    #[tokio::test]
    async fn test_update_one_none_when_no_match() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        let result = leads
            .update_one(&json!({"id": Uuid::new_v4()}), &doc(json!({"x": 1})))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_many_by_ids_counts_actual_removals() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        let a = leads.insert_one(doc(json!({}))).await.unwrap();
        let b = leads.insert_one(doc(json!({}))).await.unwrap();

        let ids = vec![a.id().unwrap(), b.id().unwrap(), Uuid::new_v4()];
        let removed = leads.delete_many_by_ids(&ids).await.unwrap();
        assert_eq!(removed, 2);
        assert!(leads.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_many_with_malformed_filter_removes_nothing() {
        let store = DocumentStore::new();
        let leads = store.collection("leads");
        leads.insert_one(doc(json!({"a": 1}))).await.unwrap();

        let result = leads.delete_many(&json!({"a": {"$bogus": 1}})).await;
        assert!(result.is_err());
        assert_eq!(leads.len().await, 1);
    }

    #[tokio::test]
    async fn test_reading_untouched_collection_is_empty() {
        let store = DocumentStore::new();
        let ghosts = store.collection("ghosts");
        assert_eq!(ghosts.find(&json!({}), &FindOptions::default()).await.unwrap().len(), 0);
        assert!(ghosts.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
