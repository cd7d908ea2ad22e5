use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A schemaless document: a JSON object with an `id` field once stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document(pub Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Serialize any entity into a document. Fails when the value does not
    /// serialize to a JSON object.
    pub fn from_entity<T: Serialize>(entity: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(entity)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidDocument(other.to_string())),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dotted-path lookup with Mongo-style array traversal: descending into an
    /// array maps the remaining path over its elements.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        path_value(&self.to_value(), path)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_str(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The document identity, when present and well formed.
    pub fn id(&self) -> Option<Uuid> {
        self.get_str("id").and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dotted-path lookup on a raw JSON value. `None` means the path is absent;
/// a present-but-null field resolves to `Some(Value::Null)`.
pub(crate) fn path_value(root: &Value, path: &str) -> Option<Value> {
    fn walk(value: &Value, segments: &[&str]) -> Option<Value> {
        let Some((head, rest)) = segments.split_first() else {
            return Some(value.clone());
        };
        match value {
            Value::Object(map) => map.get(*head).and_then(|next| walk(next, rest)),
            Value::Array(items) => {
                let collected: Vec<Value> = items
                    .iter()
                    .filter_map(|item| walk(item, segments))
                    .collect();
                if collected.is_empty() {
                    None
                } else {
                    Some(Value::Array(collected))
                }
            }
            _ => None,
        }
    }
    let segments: Vec<&str> = path.split('.').collect();
    walk(root, &segments)
}

/// Identity of a raw stored value.
pub(crate) fn value_id(value: &Value) -> Option<Uuid> {
    value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}
