use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit and lifecycle fields every persisted document carries. Domain
/// entities embed these with `#[serde(flatten)]`.
///
/// `is_delete` is the soft-delete marker. Read paths do not filter on it
/// implicitly; callers opt in via [`crate::search::exclude_deleted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    #[serde(default = "Utc::now")]
    pub created_on: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_modified_on: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_delete: bool,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub changed_by: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

impl Default for AuditFields {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            created_on: now,
            last_modified_on: now,
            is_active: true,
            is_delete: false,
            created_by: None,
            changed_by: None,
        }
    }
}

impl AuditFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit fields attributed to an acting identity.
    pub fn by(actor: Uuid) -> Self {
        Self {
            created_by: Some(actor),
            changed_by: Some(actor),
            ..Self::default()
        }
    }
}

/// The structural contract for stored entities.
pub trait Entity:
    Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;

    fn id(&self) -> Uuid {
        self.audit().id
    }
}

/// Windowing parameters. `limit == 0` is the explicit "no limit" sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { skip: 0, limit: 10 }
    }
}

impl Pagination {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }

    /// The whole result set in one page.
    pub fn all() -> Self {
        Self { skip: 0, limit: 0 }
    }
}

/// The envelope every listing operation returns. `count` is the total number
/// of matching rows for the filter, independent of windowing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult<T> {
    pub data: Vec<T>,
    pub count: i64,
}

impl<T> QueryResult<T> {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            count: 0,
        }
    }
}

/// Identity-plus-label projection used by typeahead lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelItem {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

/// Outcome of a bulk removal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}
