// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record to query parameter mapping
//!
//! A record is one JSON value taken from a batch. The mapping decides which
//! parts of it become query parameters:
//!
//! | Mapping      | Record `{"payload": {"user": {"id": 7}}}` |
//! |--------------|--------------------------------------------|
//! | `Record`     | `:payload` = `'{"user":{"id":7}}'`         |
//! | `Positional` | `["payload.user.id"]` -> `?1` = `7`        |
//! | `Named`      | `{id: "payload.user.id"}` -> `:id` = `7`   |

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Parameter mapping errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Empty parameter path at position {0}")]
    EmptyPath(usize),

    #[error("Empty segment in parameter path '{0}'")]
    EmptySegment(String),

    #[error("Empty parameter name")]
    EmptyName,

    #[error("Query expects {expected} positional parameters, record supplied {supplied}")]
    ParameterCount { expected: usize, supplied: usize },

    #[error("Query parameter {0} has no name and cannot be bound by name")]
    UnnamedParameter(usize),
}

/// How records of a batch are turned into query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParameterMapping {
    /// Use each record as-is.
    ///
    /// An object binds its top-level fields by name, an array binds its
    /// elements by position, any other value is the single positional
    /// parameter.
    #[default]
    Record,

    /// Dotted paths, bound positionally in list order.
    Positional(Vec<String>),

    /// Parameter name to dotted path, bound by name.
    Named(BTreeMap<String, String>),
}

/// Parameters extracted from one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Bindings {
    Positional(Vec<Value>),
    Named(BTreeMap<String, Value>),
}

impl ParameterMapping {
    /// Reject empty paths and names.
    pub fn validate(&self) -> Result<(), MappingError> {
        match self {
            ParameterMapping::Record => Ok(()),
            ParameterMapping::Positional(paths) => {
                for (index, path) in paths.iter().enumerate() {
                    validate_path(index, path)?;
                }
                Ok(())
            }
            ParameterMapping::Named(paths) => {
                for (index, (name, path)) in paths.iter().enumerate() {
                    if name.is_empty() {
                        return Err(MappingError::EmptyName);
                    }
                    validate_path(index, path)?;
                }
                Ok(())
            }
        }
    }

    /// Extract the parameters of one record.
    pub fn map(&self, record: &Value) -> Bindings {
        match self {
            ParameterMapping::Record => match record {
                Value::Object(fields) => Bindings::Named(
                    fields
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect(),
                ),
                Value::Array(values) => Bindings::Positional(values.clone()),
                scalar => Bindings::Positional(vec![scalar.clone()]),
            },
            ParameterMapping::Positional(paths) => Bindings::Positional(
                paths.iter().map(|path| resolve_path(record, path)).collect(),
            ),
            ParameterMapping::Named(paths) => Bindings::Named(
                paths
                    .iter()
                    .map(|(name, path)| (name.clone(), resolve_path(record, path)))
                    .collect(),
            ),
        }
    }
}

fn validate_path(index: usize, path: &str) -> Result<(), MappingError> {
    if path.is_empty() {
        return Err(MappingError::EmptyPath(index));
    }
    if path.split('.').any(str::is_empty) {
        return Err(MappingError::EmptySegment(path.to_string()));
    }
    Ok(())
}

/// Follow a dotted path through nested objects.
///
/// Returns `Null` as soon as a segment is missing or the current value is
/// not an object.
pub fn resolve_path(record: &Value, path: &str) -> Value {
    let mut current = record;
    for segment in path.split('.') {
        match current {
            Value::Object(fields) => match fields.get(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message() -> Value {
        json!({
            "exchange": "logs",
            "payload": {
                "user": { "id": 7, "tags": ["a", "b"] },
                "text": "hello"
            }
        })
    }

    #[test]
    fn test_resolve_nested_path() {
        let record = message();

        assert_eq!(resolve_path(&record, "payload.user.id"), json!(7));
        assert_eq!(resolve_path(&record, "payload.text"), json!("hello"));
        assert_eq!(
            resolve_path(&record, "payload.user"),
            json!({ "id": 7, "tags": ["a", "b"] })
        );
    }

    #[test]
    fn test_resolve_missing_path_is_null() {
        let record = message();

        assert_eq!(resolve_path(&record, "payload.missing"), Value::Null);
        assert_eq!(resolve_path(&record, "payload.text.length"), Value::Null);
        assert_eq!(resolve_path(&json!([1, 2]), "0"), Value::Null);
    }

    #[test]
    fn test_record_mapping_by_shape() {
        let mapping = ParameterMapping::Record;

        let named = mapping.map(&json!({ "a": 1, "b": "x" }));
        assert_eq!(
            named,
            Bindings::Named(BTreeMap::from([
                ("a".to_string(), json!(1)),
                ("b".to_string(), json!("x")),
            ]))
        );

        assert_eq!(
            mapping.map(&json!([1, "two"])),
            Bindings::Positional(vec![json!(1), json!("two")])
        );
        assert_eq!(
            mapping.map(&json!("alone")),
            Bindings::Positional(vec![json!("alone")])
        );
    }

    #[test]
    fn test_positional_mapping_keeps_order() {
        let mapping = ParameterMapping::Positional(vec![
            "payload.text".into(),
            "exchange".into(),
            "payload.nope".into(),
        ]);

        assert_eq!(
            mapping.map(&message()),
            Bindings::Positional(vec![json!("hello"), json!("logs"), Value::Null])
        );
    }

    #[test]
    fn test_named_mapping() {
        let mapping = ParameterMapping::Named(BTreeMap::from([
            ("user_id".to_string(), "payload.user.id".to_string()),
            ("tags".to_string(), "payload.user.tags".to_string()),
        ]));

        let Bindings::Named(values) = mapping.map(&message()) else {
            panic!("expected named bindings");
        };
        assert_eq!(values["user_id"], json!(7));
        assert_eq!(values["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        assert_eq!(
            ParameterMapping::Positional(vec!["ok".into(), String::new()]).validate(),
            Err(MappingError::EmptyPath(1))
        );
        assert_eq!(
            ParameterMapping::Positional(vec!["payload..id".into()]).validate(),
            Err(MappingError::EmptySegment("payload..id".into()))
        );
        assert_eq!(
            ParameterMapping::Named(BTreeMap::from([(String::new(), "a".to_string())])).validate(),
            Err(MappingError::EmptyName)
        );
        assert!(ParameterMapping::Record.validate().is_ok());
    }

    #[test]
    fn test_mapping_deserializes_from_list_or_map() {
        let list: ParameterMapping = serde_json::from_value(json!(["a", "b.c"])).unwrap();
        assert_eq!(
            list,
            ParameterMapping::Positional(vec!["a".into(), "b.c".into()])
        );

        let map: ParameterMapping = serde_json::from_value(json!({ "x": "a.b" })).unwrap();
        assert_eq!(
            map,
            ParameterMapping::Named(BTreeMap::from([("x".to_string(), "a.b".to_string())]))
        );
    }
}
