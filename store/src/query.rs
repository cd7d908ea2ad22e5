use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::document::path_value;
use crate::error::{Result, StoreError};

/// A match filter: a JSON object in the store's query language.
pub type Filter = Value;

/// Evaluate a filter against a document. An empty object matches everything.
pub fn matches(filter: &Filter, doc: &Value) -> Result<bool> {
    let Some(conditions) = filter.as_object() else {
        return Err(StoreError::InvalidFilter(filter.to_string()));
    };

    for (key, condition) in conditions {
        let matched = match key.as_str() {
            "$or" => {
                let branches = condition
                    .as_array()
                    .ok_or_else(|| StoreError::InvalidFilter(filter.to_string()))?;
                let mut any = false;
                for branch in branches {
                    if matches(branch, doc)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let branches = condition
                    .as_array()
                    .ok_or_else(|| StoreError::InvalidFilter(filter.to_string()))?;
                let mut all = true;
                for branch in branches {
                    if !matches(branch, doc)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$expr" => is_truthy(&eval(condition, doc)?),
            path => field_matches(path, condition, doc)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(path: &str, condition: &Value, doc: &Value) -> Result<bool> {
    let actual = path_value(doc, path);

    if let Some(operators) = condition.as_object() {
        if !operators.is_empty() && operators.keys().all(|k| k.starts_with('$')) {
            for (op, operand) in operators {
                let present = actual.clone().unwrap_or(Value::Null);
                let ok = match op.as_str() {
                    "$eq" => values_equal(&present, operand),
                    "$ne" => !values_equal(&present, operand),
                    "$gt" => ordered(&actual, operand, |o| o == Ordering::Greater),
                    "$gte" => ordered(&actual, operand, |o| o != Ordering::Less),
                    "$lt" => ordered(&actual, operand, |o| o == Ordering::Less),
                    "$lte" => ordered(&actual, operand, |o| o != Ordering::Greater),
                    "$in" => operand
                        .as_array()
                        .map(|set| set.iter().any(|v| values_equal(&present, v)))
                        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?,
                    "$nin" => operand
                        .as_array()
                        .map(|set| !set.iter().any(|v| values_equal(&present, v)))
                        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?,
                    "$exists" => is_truthy(operand) == actual.is_some(),
                    "$regex" => {
                        let pattern = operand
                            .as_str()
                            .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?;
                        let options = operators.get("$options").and_then(Value::as_str);
                        let re = build_regex(pattern, options)?;
                        actual
                            .as_ref()
                            .and_then(Value::as_str)
                            .is_some_and(|s| re.is_match(s))
                    }
                    // Consumed together with $regex.
                    "$options" => true,
                    other => {
                        return Err(StoreError::InvalidFilter(format!(
                            "unsupported operator '{other}'"
                        )))
                    }
                };
                if !ok {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }

    Ok(values_equal(&actual.unwrap_or(Value::Null), condition))
}

fn ordered(actual: &Option<Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(value) => accept(compare_values(value, operand)),
        None => false,
    }
}

/// Aggregation expression evaluator, shared by `$expr` and `$project`.
pub(crate) fn eval(expr: &Value, doc: &Value) -> Result<Value> {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            Ok(path_value(doc, &s[1..]).unwrap_or(Value::Null))
        }
        Value::Object(map) if map.len() == 1 => {
            let Some((op, operand)) = map.iter().next() else {
                return Ok(expr.clone());
            };
            match op.as_str() {
                "$concat" => eval_concat(operand, doc),
                "$ifNull" => {
                    let args = expect_args(operand, 2)?;
                    let first = eval(&args[0], doc)?;
                    if first.is_null() {
                        eval(&args[1], doc)
                    } else {
                        Ok(first)
                    }
                }
                "$arrayElemAt" => {
                    let args = expect_args(operand, 2)?;
                    let array = eval(&args[0], doc)?;
                    let index = eval(&args[1], doc)?
                        .as_i64()
                        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?;
                    Ok(array_elem_at(&array, index))
                }
                "$regexMatch" => eval_regex_match(operand, doc),
                "$literal" => Ok(operand.clone()),
                _ => Ok(expr.clone()),
            }
        }
        other => Ok(other.clone()),
    }
}

fn eval_concat(operand: &Value, doc: &Value) -> Result<Value> {
    let parts = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?;
    let mut out = String::new();
    for part in parts {
        match eval(part, doc)? {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => out.push_str(&s),
            other => return Err(StoreError::InvalidFilter(other.to_string())),
        }
    }
    Ok(Value::String(out))
}

fn eval_regex_match(operand: &Value, doc: &Value) -> Result<Value> {
    let spec = operand
        .as_object()
        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?;
    let input = match spec.get("input") {
        Some(expr) => eval(expr, doc)?,
        None => Value::Null,
    };
    // A null input never matches; the field may simply be absent.
    let Some(input) = input.as_str() else {
        return Ok(Value::Bool(false));
    };
    let pattern = spec
        .get("regex")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))?;
    let options = spec.get("options").and_then(Value::as_str);
    let re = build_regex(pattern, options)?;
    Ok(Value::Bool(re.is_match(input)))
}

fn array_elem_at(array: &Value, index: i64) -> Value {
    let Some(items) = array.as_array() else {
        return Value::Null;
    };
    let len = items.len() as i64;
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 || resolved >= len {
        Value::Null
    } else {
        items[resolved as usize].clone()
    }
}

fn expect_args(operand: &Value, count: usize) -> Result<&Vec<Value>> {
    operand
        .as_array()
        .filter(|args| args.len() == count)
        .ok_or_else(|| StoreError::InvalidFilter(operand.to_string()))
}

pub(crate) fn build_regex(pattern: &str, options: Option<&str>) -> Result<Regex> {
    let pattern = if options.is_some_and(|o| o.contains('i')) {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Ok(Regex::new(&pattern)?)
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Total ordering over stored values: null < numbers < strings < booleans.
/// Strings that both parse as RFC 3339 instants compare as instants, so
/// fractional-second width never changes their order.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => compare_strings(x, y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    match (parse_instant(a), parse_instant(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_matches_everything() {
        let doc = json!({"first_name": "John"});
        assert!(matches(&json!({}), &doc).unwrap());
    }

    #[test]
    fn test_equality_and_operators() {
        let doc = json!({"status": "open", "attempts": 3, "is_delete": false});

        assert!(matches(&json!({"status": "open"}), &doc).unwrap());
        assert!(!matches(&json!({"status": "closed"}), &doc).unwrap());
        assert!(matches(&json!({"attempts": {"$gte": 3}}), &doc).unwrap());
        assert!(!matches(&json!({"attempts": {"$lt": 3}}), &doc).unwrap());
        assert!(matches(&json!({"status": {"$in": ["open", "held"]}}), &doc).unwrap());
        assert!(matches(&json!({"is_delete": false}), &doc).unwrap());
        assert!(matches(&json!({"missing": {"$exists": false}}), &doc).unwrap());
    }

    #[test]
    fn test_or_across_fields() {
        let doc = json!({"first_name": "Mary", "last_name": "Johnson"});
        let filter = json!({"$or": [
            {"first_name": {"$regex": "jo", "$options": "i"}},
            {"last_name": {"$regex": "jo", "$options": "i"}}
        ]});
        assert!(matches(&filter, &doc).unwrap());
    }

    #[test]
    fn test_regex_is_case_insensitive_with_option() {
        let doc = json!({"first_name": "John"});
        assert!(matches(&json!({"first_name": {"$regex": "jo", "$options": "i"}}), &doc).unwrap());
        assert!(!matches(&json!({"first_name": {"$regex": "jo"}}), &doc).unwrap());
    }

    #[test]
    fn test_expr_concat_regex_match() {
        let doc = json!({"first_name": "Mary", "last_name": "Johnson"});
        let filter = json!({"$expr": {"$regexMatch": {
            "input": {"$concat": ["$first_name", " ", "$last_name"]},
            "regex": "ry jo",
            "options": "i"
        }}});
        assert!(matches(&filter, &doc).unwrap());

        // Missing parts collapse the concatenation to null, which never matches.
        let partial = json!({"first_name": "Mary"});
        assert!(!matches(&filter, &partial).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let doc = json!({"a": 1});
        assert!(matches(&json!({"a": {"$near": 1}}), &doc).is_err());
    }

    #[test]
    fn test_timestamp_ordering_ignores_fraction_width() {
        // Lexicographically "...00Z" > "...00.5Z", but as instants it is earlier.
        let earlier = json!("2026-08-28T12:00:00Z");
        let later = json!("2026-08-28T12:00:00.500Z");
        assert_eq!(compare_values(&earlier, &later), Ordering::Less);
    }

    #[test]
    fn test_if_null_and_array_elem_at() {
        let doc = json!({"count": [{"count": 25}]});
        let expr = json!({"$ifNull": [{"$arrayElemAt": ["$count.count", 0]}, 0]});
        assert_eq!(eval(&expr, &doc).unwrap(), json!(25));

        let empty = json!({"count": []});
        assert_eq!(eval(&expr, &empty).unwrap(), json!(0));
    }
}
