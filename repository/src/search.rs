//! Search-condition builders: turn a raw search key into a document filter or
//! a pipeline-stage sequence. Keys are regex-escaped, so metacharacters in
//! user input keep their literal meaning.

use serde_json::{json, Map, Value};

use dialhub_store::{Filter, Stage};

fn regex_clause(field: &str, pattern: &str) -> Value {
    let mut clause = Map::new();
    clause.insert(
        field.to_string(),
        json!({"$regex": pattern, "$options": "i"}),
    );
    Value::Object(clause)
}

fn name_conditions(pattern: &str, prefix: &str) -> Value {
    let field = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    };
    json!({"$or": [
        regex_clause(&field("first_name"), pattern),
        regex_clause(&field("last_name"), pattern),
        {"$expr": {"$regexMatch": {
            "input": {"$concat": [
                format!("${}", field("first_name")),
                " ",
                format!("${}", field("last_name"))
            ]},
            "regex": pattern,
            "options": "i"
        }}}
    ]})
}

/// Case-insensitive name search: matches a substring of the first name, the
/// last name, or the concatenated full name, so a key spanning both halves
/// still hits. An empty key matches everything.
pub fn by_name(key: &str) -> Filter {
    let key = key.trim();
    if key.is_empty() {
        return json!({});
    }
    name_conditions(&regex::escape(key), "")
}

/// The same condition as a pipeline-stage sequence against joined field paths
/// (`<joined>.first_name`, ...), for use after a join. An empty key yields an
/// empty sequence (no-op).
pub fn by_aggregated_name(key: &str, joined: &str) -> Vec<Stage> {
    let key = key.trim();
    if key.is_empty() {
        return Vec::new();
    }
    vec![Stage::Match(name_conditions(&regex::escape(key), joined))]
}

/// Merge the soft-delete exclusion into a filter. Read paths never exclude
/// soft-deleted rows on their own; this is the uniform opt-in.
pub fn exclude_deleted(filter: Filter) -> Filter {
    match filter {
        Value::Object(mut map) => {
            map.insert("is_delete".to_string(), json!(false));
            Value::Object(map)
        }
        _ => json!({"is_delete": false}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialhub_store::query::matches;

    fn fixtures() -> Vec<Value> {
        vec![
            json!({"first_name": "John"}),
            json!({"last_name": "Johnson"}),
            json!({"first_name": "Mary", "last_name": "Johnson"}),
            json!({"first_name": "Alice", "last_name": "Smith"}),
        ]
    }

    #[test]
    fn test_empty_key_matches_everything() {
        let filter = by_name("");
        for doc in fixtures() {
            assert!(matches(&filter, &doc).unwrap());
        }
        assert_eq!(by_name("   "), json!({}));
    }

    #[test]
    fn test_key_matches_either_name_half() {
        let filter = by_name("jo");
        let hits: Vec<bool> = fixtures()
            .iter()
            .map(|doc| matches(&filter, doc).unwrap())
            .collect();
        assert_eq!(hits, vec![true, true, true, false]);
    }

    #[test]
    fn test_key_spanning_full_name() {
        let filter = by_name("ry john");
        let doc = json!({"first_name": "Mary", "last_name": "Johnson"});
        assert!(matches(&filter, &doc).unwrap());
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let filter = by_name("JOHN");
        assert!(matches(&filter, &json!({"first_name": "john"})).unwrap());
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let filter = by_name("o.");
        assert!(!matches(&filter, &json!({"first_name": "John"})).unwrap());
        assert!(matches(&filter, &json!({"first_name": "o."})).unwrap());
    }

    #[test]
    fn test_aggregated_form_targets_joined_paths() {
        assert!(by_aggregated_name("", "owner").is_empty());

        let stages = by_aggregated_name("jo", "owner");
        assert_eq!(stages.len(), 1);
        let Stage::Match(filter) = &stages[0] else {
            panic!("expected a match stage");
        };
        let doc = json!({"owner": {"first_name": "John"}});
        assert!(matches(filter, &doc).unwrap());
        let miss = json!({"owner": {"first_name": "Alice", "last_name": "Smith"}});
        assert!(!matches(filter, &miss).unwrap());
    }

    #[test]
    fn test_exclude_deleted_merges_flag() {
        let filter = exclude_deleted(json!({"status": "open"}));
        assert_eq!(filter, json!({"status": "open", "is_delete": false}));
        assert_eq!(exclude_deleted(json!({})), json!({"is_delete": false}));
    }
}
