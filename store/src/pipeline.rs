use std::cmp::Ordering;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::document::path_value;
use crate::error::{Result, StoreError};
use crate::query::{self, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One aggregation stage. Pipelines are plain data so the builders that
/// compose them stay independently testable.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort { field: String, order: SortOrder },
    Skip(i64),
    Limit(i64),
    Project(Value),
    Count(String),
    Group { id: Value, fields: Map<String, Value> },
    Facet(IndexMap<String, Vec<Stage>>),
}

/// Run a pipeline over a materialized input set.
pub fn run(stages: &[Stage], mut docs: Vec<Value>) -> Result<Vec<Value>> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if query::matches(filter, &doc)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            Stage::Sort { field, order } => {
                // Stable sort: ties keep natural storage order.
                docs.sort_by(|a, b| {
                    let left = path_value(a, field).unwrap_or(Value::Null);
                    let right = path_value(b, field).unwrap_or(Value::Null);
                    let ordering = query::compare_values(&left, &right);
                    match order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                });
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip((*n).max(0) as usize).collect(),
            Stage::Limit(n) => {
                docs.truncate((*n).max(0) as usize);
                docs
            }
            Stage::Project(spec) => {
                let rules = spec
                    .as_object()
                    .ok_or_else(|| StoreError::InvalidStage(spec.to_string()))?;
                let mut projected = Vec::with_capacity(docs.len());
                for doc in &docs {
                    projected.push(project_doc(rules, doc)?);
                }
                projected
            }
            Stage::Count(name) => {
                // Mongo semantics: an empty input emits no document at all.
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Map::new();
                    out.insert(name.clone(), Value::Number(Number::from(docs.len())));
                    vec![Value::Object(out)]
                }
            }
            Stage::Group { id, fields } => group_docs(id, fields, &docs)?,
            Stage::Facet(branches) => {
                let mut out = Map::new();
                for (name, branch) in branches {
                    let result = run(branch, docs.clone())?;
                    out.insert(name.clone(), Value::Array(result));
                }
                vec![Value::Object(out)]
            }
        };
    }
    Ok(docs)
}

fn project_doc(rules: &Map<String, Value>, doc: &Value) -> Result<Value> {
    let mut out = Map::new();
    for (key, rule) in rules {
        match rule {
            Value::Number(n) if n.as_i64() == Some(1) => {
                if let Some(value) = path_value(doc, key) {
                    out.insert(key.clone(), value);
                }
            }
            Value::Bool(true) => {
                if let Some(value) = path_value(doc, key) {
                    out.insert(key.clone(), value);
                }
            }
            Value::Number(n) if n.as_i64() == Some(0) => {}
            Value::Bool(false) => {}
            // Field rename: a missing source omits the output field.
            Value::String(s) if s.starts_with('$') => {
                if let Some(value) = path_value(doc, &s[1..]) {
                    out.insert(key.clone(), value);
                }
            }
            expression => {
                out.insert(key.clone(), query::eval(expression, doc)?);
            }
        }
    }
    Ok(Value::Object(out))
}

fn group_docs(id: &Value, fields: &Map<String, Value>, docs: &[Value]) -> Result<Vec<Value>> {
    // Keyed by the serialized group key; first-seen order is kept.
    let mut groups: IndexMap<String, (Value, IndexMap<String, f64>)> = IndexMap::new();

    for doc in docs {
        let key_value = query::eval(id, doc)?;
        let key = key_value.to_string();
        let entry = groups
            .entry(key)
            .or_insert_with(|| (key_value, IndexMap::new()));

        for (name, accumulator) in fields {
            let operand = accumulator
                .get("$sum")
                .ok_or_else(|| StoreError::InvalidStage(accumulator.to_string()))?;
            let increment = match operand {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(path) if path.starts_with('$') => path_value(doc, &path[1..])
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0),
                other => return Err(StoreError::InvalidStage(other.to_string())),
            };
            *entry.1.entry(name.clone()).or_insert(0.0) += increment;
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (_, (key_value, sums)) in groups {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), key_value);
        for (name, total) in sums {
            let value = if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
                Value::Number(Number::from(total as i64))
            } else {
                Value::from(total)
            };
            doc.insert(name, value);
        }
        out.push(Value::Object(doc));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Vec<Value> {
        vec![
            json!({"id": "a", "status": "open", "created_on": "2026-01-01T00:00:00Z"}),
            json!({"id": "b", "status": "open", "created_on": "2026-01-03T00:00:00Z"}),
            json!({"id": "c", "status": "held", "created_on": "2026-01-02T00:00:00Z"}),
        ]
    }

    #[test]
    fn test_match_then_sort_desc() {
        let stages = vec![
            Stage::Match(json!({"status": "open"})),
            Stage::Sort {
                field: "created_on".to_string(),
                order: SortOrder::Desc,
            },
        ];
        let out = run(&stages, fixture()).unwrap();
        let ids: Vec<&str> = out.iter().filter_map(|d| d["id"].as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_skip_and_limit_window() {
        let stages = vec![Stage::Skip(1), Stage::Limit(1)];
        let out = run(&stages, fixture()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], json!("b"));
    }

    #[test]
    fn test_skip_past_end_is_empty() {
        let out = run(&[Stage::Skip(10)], fixture()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_count_emits_nothing_on_empty_input() {
        let out = run(&[Stage::Count("count".to_string())], Vec::new()).unwrap();
        assert!(out.is_empty());

        let out = run(&[Stage::Count("count".to_string())], fixture()).unwrap();
        assert_eq!(out, vec![json!({"count": 3})]);
    }

    #[test]
    fn test_facet_splits_data_and_count() {
        let mut branches = IndexMap::new();
        branches.insert(
            "data".to_string(),
            vec![Stage::Sort {
                field: "created_on".to_string(),
                order: SortOrder::Desc,
            }],
        );
        branches.insert("count".to_string(), vec![Stage::Count("count".to_string())]);

        let stages = vec![
            Stage::Facet(branches),
            Stage::Project(json!({
                "data": 1,
                "count": {"$ifNull": [{"$arrayElemAt": ["$count.count", 0]}, 0]}
            })),
        ];
        let out = run(&stages, fixture()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["count"], json!(3));
        assert_eq!(out[0]["data"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_facet_count_normalizes_to_zero_when_empty() {
        let mut branches = IndexMap::new();
        branches.insert("data".to_string(), Vec::new());
        branches.insert("count".to_string(), vec![Stage::Count("count".to_string())]);

        let stages = vec![
            Stage::Match(json!({"status": "missing"})),
            Stage::Facet(branches),
            Stage::Project(json!({
                "data": 1,
                "count": {"$ifNull": [{"$arrayElemAt": ["$count.count", 0]}, 0]}
            })),
        ];
        let out = run(&stages, fixture()).unwrap();
        assert_eq!(out[0]["count"], json!(0));
        assert_eq!(out[0]["data"], json!([]));
    }

    #[test]
    fn test_group_count() {
        let mut fields = Map::new();
        fields.insert("count".to_string(), json!({"$sum": 1}));
        let stages = vec![Stage::Group {
            id: Value::Null,
            fields,
        }];
        let out = run(&stages, fixture()).unwrap();
        assert_eq!(out, vec![json!({"_id": null, "count": 3})]);
    }

    #[test]
    fn test_group_on_empty_input_emits_nothing() {
        let mut fields = Map::new();
        fields.insert("count".to_string(), json!({"$sum": 1}));
        let stages = vec![Stage::Group {
            id: Value::Null,
            fields,
        }];
        let out = run(&stages, Vec::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_project_rename_omits_missing_source() {
        let stages = vec![Stage::Project(json!({"id": 1, "name": "$label"}))];
        let out = run(&stages, vec![json!({"id": "a"})]).unwrap();
        assert_eq!(out[0], json!({"id": "a"}));
    }
}
