// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON to SQLite value conversion

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Convert a JSON value into the value bound to a query parameter.
///
/// Arrays and objects are stored as their JSON text. Integers that do not
/// fit in an `i64` fall back to `REAL`.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number
                .as_f64()
                .map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
