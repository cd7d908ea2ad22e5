// Generic document repository: the single data-access surface every domain
// module (users, roles, leads, bookings, calls, campaigns, ...) composes on.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{json, Value};
use uuid::Uuid;

use dialhub_store::{
    Collection, Document, DocumentStore, Filter, FindOptions, SortOrder, Stage,
};

use crate::error::{RepositoryError, Result};
use crate::models::{DeleteResult, Entity, LabelItem, Pagination, QueryResult};
use crate::pagination;
use crate::populate::{self, PopulateSpec};

const CREATED_ON: &str = "created_on";

/// Base repository trait with the common CRUD operations.
#[async_trait]
pub trait Repository<T: Entity> {
    /// Create a new entity
    async fn create_entity(&self, entity: &T) -> Result<T>;

    /// Find entity by ID
    async fn find_entity(&self, id: Uuid) -> Result<Option<T>>;

    /// Update an existing entity
    async fn update_entity(&self, entity: &T) -> Result<T>;

    /// Permanently delete an entity by ID
    async fn delete_entity(&self, id: Uuid) -> Result<bool>;

    /// List entities with pagination
    async fn list(&self, pagination: &Pagination) -> Result<QueryResult<T>>;
}

/// A reusable repository over one collection, parameterized by the entity
/// type. Stateless aside from its handles; cheap to clone per request.
#[derive(Clone)]
pub struct GenericRepository<T> {
    store: DocumentStore,
    collection: Collection,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> GenericRepository<T> {
    pub fn new(store: &DocumentStore, collection: &str) -> Self {
        Self {
            store: store.clone(),
            collection: store.collection(collection),
            _entity: PhantomData,
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Insert a document. Stamps `created_on == last_modified_on`, carries the
    /// audit actors as given, and returns the materialized document with
    /// `populate` references resolved.
    pub async fn create(&self, entity: &T, populate: &[PopulateSpec]) -> Result<Document> {
        let mut doc = Document::from_entity(entity)?;
        let now = json!(Utc::now());
        doc.set("created_on", now.clone());
        doc.set("last_modified_on", now);

        let stored = self.collection.insert_one(doc).await?;
        tracing::debug!(collection = %self.collection.name(), id = ?stored.id(), "created document");
        populate::apply(&self.store, stored, populate).await
    }

    /// Apply the entity as a patch against the first document matching
    /// `filter` (default: the entity's own id). The patch never carries `id`,
    /// `created_on`, or `created_by`, and always overwrites
    /// `last_modified_on`. Fails with [`RepositoryError::NotFound`] when
    /// nothing matches.
    pub async fn update(
        &self,
        entity: &T,
        populate: &[PopulateSpec],
        filter: Option<Filter>,
    ) -> Result<Document> {
        let mut patch = Document::from_entity(entity)?;
        patch.remove("id");
        patch.remove("created_on");
        patch.remove("created_by");
        patch.set("last_modified_on", json!(Utc::now()));

        let filter = filter.unwrap_or_else(|| json!({"id": entity.id()}));
        match self.collection.update_one(&filter, &patch).await? {
            Some(updated) => {
                tracing::debug!(collection = %self.collection.name(), id = ?updated.id(), "updated document");
                populate::apply(&self.store, updated, populate).await
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    /// One aggregation round trip producing a full page envelope: a match
    /// stage, a facet splitting sorted data from the total count, and a
    /// projection normalizing the count to 0 when the facet is empty. The
    /// final window is applied over the data branch afterwards, so the count
    /// is always taken before windowing.
    pub async fn filter_with_pagination(
        &self,
        filter: Filter,
        page: &Pagination,
    ) -> Result<QueryResult<T>> {
        let data_branch = vec![sort_newest_first()];
        let (rows, count) = self.run_faceted(filter, data_branch).await?;

        let windowed = pagination::window(page.skip, page.limit, rows);
        let mut data = Vec::with_capacity(windowed.len());
        for row in windowed {
            data.push(serde_json::from_value(row)?);
        }
        Ok(QueryResult { data, count })
    }

    /// The typeahead variant: same faceted shape, but windowed inside the
    /// pipeline and projected down to `{id, name}`.
    pub async fn filter_search(
        &self,
        filter: Filter,
        page: &Pagination,
        label_field: &str,
    ) -> Result<QueryResult<LabelItem>> {
        let mut data_branch = vec![sort_newest_first()];
        data_branch.extend(pagination::stages(page.skip, page.limit));
        data_branch.push(Stage::Project(json!({
            "id": 1,
            "name": format!("${label_field}"),
        })));

        let (rows, count) = self.run_faceted(filter, data_branch).await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(serde_json::from_value(row)?);
        }
        Ok(QueryResult { data, count })
    }

    /// Unwindowed listing, newest first. No count is computed; callers that
    /// need one use [`Self::filter_with_pagination`].
    pub async fn filter(&self, filter: Filter, options: FindOptions) -> Result<Vec<T>> {
        let mut options = options;
        if options.sort.is_none() {
            options.sort = Some((CREATED_ON.to_string(), SortOrder::Desc));
        }
        let docs = self.collection.find(&filter, &options).await?;
        docs.iter()
            .map(|doc| doc.deserialize().map_err(RepositoryError::from))
            .collect()
    }

    /// First match or `None`; absence is never an error.
    pub async fn find_one(&self, filter: Filter) -> Result<Option<T>> {
        match self.collection.find_one(&filter).await? {
            Some(doc) => Ok(Some(doc.deserialize()?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<T>> {
        match self.collection.find_by_id(id).await? {
            Some(doc) => Ok(Some(doc.deserialize()?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<T>> {
        self.filter(json!({"id": {"$in": ids}}), FindOptions::default())
            .await
    }

    /// The ordinary delete: mark the document `is_delete` and stamp the
    /// acting identity. Returns the updated snapshot.
    pub async fn soft_delete(&self, id: Uuid, changed_by: Option<Uuid>) -> Result<Document> {
        let mut patch = Document::new();
        patch.set("is_delete", json!(true));
        patch.set("changed_by", json!(changed_by));
        patch.set("last_modified_on", json!(Utc::now()));

        match self.collection.update_one(&json!({"id": id}), &patch).await? {
            Some(updated) => Ok(updated),
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Permanent removal by identity. Exceptional by convention; ordinary
    /// deletes go through [`Self::soft_delete`]. Returns the removed snapshot.
    pub async fn hard_delete(&self, id: Uuid) -> Result<Option<T>> {
        match self.collection.delete_by_id(id).await? {
            Some(doc) => Ok(Some(doc.deserialize()?)),
            None => Ok(None),
        }
    }

    /// Permanent removal of every document whose identity is in `ids`. The
    /// count reflects actual removals, which may be fewer than `ids.len()`.
    pub async fn bulk_hard_delete(&self, ids: &[Uuid]) -> Result<DeleteResult> {
        let deleted_count = self.collection.delete_many_by_ids(ids).await?;
        Ok(DeleteResult { deleted_count })
    }

    /// Permanent removal of every match. Driver failures are wrapped, because
    /// silent partial bulk deletion is unacceptable.
    pub async fn delete_by_filter(&self, filter: Filter) -> Result<DeleteResult> {
        match self.collection.delete_many(&filter).await {
            Ok(deleted_count) => Ok(DeleteResult { deleted_count }),
            Err(cause) => {
                tracing::warn!(collection = %self.collection.name(), %cause, "delete by filter failed");
                Err(RepositoryError::BulkDeleteFailed(cause.to_string()))
            }
        }
    }

    /// Total matching documents via `match` then a null-keyed group count.
    /// An empty result is `0`, never an error.
    pub async fn count(&self, filter: Filter) -> Result<i64> {
        let mut fields = serde_json::Map::new();
        fields.insert("count".to_string(), json!({"$sum": 1}));
        let stages = vec![
            Stage::Match(filter),
            Stage::Group {
                id: Value::Null,
                fields,
            },
        ];
        let out = self.collection.aggregate(&stages).await?;
        Ok(out
            .first()
            .and_then(|group| group.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Shared faceted round trip: returns the sorted data branch and the
    /// pre-windowing total.
    async fn run_faceted(
        &self,
        filter: Filter,
        data_branch: Vec<Stage>,
    ) -> Result<(Vec<Value>, i64)> {
        let mut branches = IndexMap::new();
        branches.insert("data".to_string(), data_branch);
        branches.insert("count".to_string(), vec![Stage::Count("count".to_string())]);

        let stages = vec![
            Stage::Match(filter),
            Stage::Facet(branches),
            Stage::Project(json!({
                "data": 1,
                "count": {"$ifNull": [{"$arrayElemAt": ["$count.count", 0]}, 0]},
            })),
        ];

        let mut out = self.collection.aggregate(&stages).await?;
        let envelope = out.pop().unwrap_or_else(|| json!({"data": [], "count": 0}));
        let count = envelope.get("count").and_then(Value::as_i64).unwrap_or(0);
        let rows = match envelope.get("data") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        };
        Ok((rows, count))
    }
}

fn sort_newest_first() -> Stage {
    Stage::Sort {
        field: CREATED_ON.to_string(),
        order: SortOrder::Desc,
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for GenericRepository<T> {
    async fn create_entity(&self, entity: &T) -> Result<T> {
        Ok(self.create(entity, &[]).await?.deserialize()?)
    }

    async fn find_entity(&self, id: Uuid) -> Result<Option<T>> {
        self.find_by_id(id).await
    }

    async fn update_entity(&self, entity: &T) -> Result<T> {
        Ok(self.update(entity, &[], None).await?.deserialize()?)
    }

    async fn delete_entity(&self, id: Uuid) -> Result<bool> {
        Ok(self.hard_delete(id).await?.is_some())
    }

    async fn list(&self, pagination: &Pagination) -> Result<QueryResult<T>> {
        self.filter_with_pagination(json!({}), pagination).await
    }
}
