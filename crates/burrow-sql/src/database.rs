// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite database handle
//!
//! Runs one insert query per record of a batch, inside a single transaction,
//! so a batch is either stored entirely or not at all.

use crate::mapper::{Bindings, MappingError, ParameterMapping};
use crate::value::to_sql_value;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, Statement};
use serde_json::Value;
use std::path::PathBuf;

/// Where a database URL points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(PathBuf),
}

impl DatabaseTarget {
    /// Parse a database URL.
    ///
    /// Accepted forms:
    /// - `sqlite://` or `sqlite::memory:` (in-memory database)
    /// - `sqlite:///relative.db`, `sqlite:////absolute/path.db`
    /// - `sqlite://relative.db`
    /// - a bare file path
    pub fn parse(url: &str) -> Result<Self> {
        if url.is_empty() {
            bail!("Empty database URL");
        }
        if url == "sqlite::memory:" {
            return Ok(DatabaseTarget::Memory);
        }

        let path = match url.strip_prefix("sqlite://") {
            Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
            None if url.contains("://") => {
                bail!("Unsupported database URL '{}': only sqlite:// is available", url)
            }
            None => url,
        };

        if path.is_empty() || path == ":memory:" {
            Ok(DatabaseTarget::Memory)
        } else {
            Ok(DatabaseTarget::File(PathBuf::from(path)))
        }
    }
}

/// An insert query together with the way records feed its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertQuery {
    pub sql: String,
    pub parameters: ParameterMapping,
}

impl InsertQuery {
    pub fn new(sql: impl Into<String>, parameters: ParameterMapping) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

/// Database connection shared by every output of one block.
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
pub struct Database {
    url: String,
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database a URL points to.
    pub fn open(url: &str) -> Result<Self> {
        let conn = match DatabaseTarget::parse(url)? {
            DatabaseTarget::Memory => Connection::open_in_memory()
                .context("Failed to create in-memory SQLite database")?,
            DatabaseTarget::File(path) => Connection::open(&path).with_context(|| {
                format!("Failed to open SQLite database at {}", path.display())
            })?,
        };

        tracing::debug!(url = %url, "Connected to database");
        Ok(Self {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open("sqlite::memory:")
    }

    /// Run one or more semicolon-separated statements (schema setup).
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .with_context(|| format!("Failed to execute script on {}", self.url))
    }

    /// Run a closure against the raw connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&*conn)?)
    }

    /// Execute `query` once per record, all in one transaction.
    ///
    /// Returns the total number of rows changed. On error nothing from this
    /// batch is kept.
    pub fn execute_batch(&self, query: &InsertQuery, batch: &[Value]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .context("Failed to begin transaction")?;

        let mut changed = 0;
        {
            let mut stmt = tx
                .prepare(&query.sql)
                .with_context(|| format!("Failed to prepare query: {}", query.sql))?;

            for (index, record) in batch.iter().enumerate() {
                let bindings = query.parameters.map(record);
                changed += execute_one(&mut stmt, &bindings)
                    .with_context(|| format!("Failed to insert record {} of batch", index))?;
            }
        }

        tx.commit().context("Failed to commit batch")?;
        Ok(changed)
    }
}

/// Bind one record's parameters and step the statement.
fn execute_one(stmt: &mut Statement<'_>, bindings: &Bindings) -> Result<usize> {
    let expected = stmt.parameter_count();

    match bindings {
        Bindings::Positional(values) => {
            if values.len() != expected {
                return Err(MappingError::ParameterCount {
                    expected,
                    supplied: values.len(),
                }
                .into());
            }
            for (index, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(index + 1, to_sql_value(value))?;
            }
        }
        Bindings::Named(values) => {
            let names: Vec<Option<String>> = (1..=expected)
                .map(|index| stmt.parameter_name(index).map(str::to_owned))
                .collect();

            for (offset, name) in names.into_iter().enumerate() {
                let index = offset + 1;
                // Numbered placeholders report their name as `?NNN`.
                let name = name
                    .filter(|name| !name.starts_with('?'))
                    .ok_or(MappingError::UnnamedParameter(index))?;
                // Names carry their prefix (`:`, `@` or `$`).
                let value = values
                    .get(&name[1..])
                    .map_or(rusqlite::types::Value::Null, to_sql_value);
                stmt.raw_bind_parameter(index, value)?;
            }
        }
    }

    Ok(stmt.raw_execute()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn logs_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE logs (id INTEGER, message TEXT, extra TEXT)")
            .unwrap();
        db
    }

    fn rows(db: &Database) -> Vec<(Option<i64>, Option<String>, Option<String>)> {
        db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, message, extra FROM logs ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .unwrap()
    }

    #[test]
    fn test_parse_urls() {
        assert_eq!(DatabaseTarget::parse("sqlite://").unwrap(), DatabaseTarget::Memory);
        assert_eq!(DatabaseTarget::parse("sqlite::memory:").unwrap(), DatabaseTarget::Memory);
        assert_eq!(
            DatabaseTarget::parse("sqlite:///relay.db").unwrap(),
            DatabaseTarget::File("relay.db".into())
        );
        assert_eq!(
            DatabaseTarget::parse("sqlite:////var/lib/relay.db").unwrap(),
            DatabaseTarget::File("/var/lib/relay.db".into())
        );
        assert_eq!(
            DatabaseTarget::parse("sqlite://relay.db").unwrap(),
            DatabaseTarget::File("relay.db".into())
        );
        assert_eq!(
            DatabaseTarget::parse("data/relay.db").unwrap(),
            DatabaseTarget::File("data/relay.db".into())
        );
        assert!(DatabaseTarget::parse("postgresql://localhost/db").is_err());
        assert!(DatabaseTarget::parse("").is_err());
    }

    #[test]
    fn test_record_mapping_binds_fields_by_name() {
        let db = logs_db();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message) VALUES (:id, :message)",
            ParameterMapping::Record,
        );
        let batch = vec![
            json!({ "id": 1, "message": "first", "ignored": true }),
            json!({ "id": 2 }),
        ];

        assert_eq!(db.execute_batch(&query, &batch).unwrap(), 2);
        assert_eq!(
            rows(&db),
            vec![
                (Some(1), Some("first".into()), None),
                (Some(2), None, None),
            ]
        );
    }

    #[test]
    fn test_positional_mapping() {
        let db = logs_db();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message, extra) VALUES (?, ?, ?)",
            ParameterMapping::Positional(vec![
                "payload.id".into(),
                "payload.text".into(),
                "payload.meta".into(),
            ]),
        );
        let batch = vec![json!({
            "payload": { "id": 9, "text": "hi", "meta": { "k": [1] } }
        })];

        db.execute_batch(&query, &batch).unwrap();
        assert_eq!(
            rows(&db),
            vec![(Some(9), Some("hi".into()), Some(r#"{"k":[1]}"#.into()))]
        );
    }

    #[test]
    fn test_named_mapping_with_missing_path_binds_null() {
        let db = logs_db();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message) VALUES (:id, :message)",
            ParameterMapping::Named(BTreeMap::from([
                ("id".to_string(), "payload.id".to_string()),
                ("message".to_string(), "payload.absent".to_string()),
            ])),
        );

        db.execute_batch(&query, &[json!({ "payload": { "id": 3 } })])
            .unwrap();
        assert_eq!(rows(&db), vec![(Some(3), None, None)]);
    }

    #[test]
    fn test_failed_record_rolls_back_batch() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE logs (id INTEGER PRIMARY KEY, message TEXT, extra TEXT)")
            .unwrap();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message) VALUES (:id, :message)",
            ParameterMapping::Record,
        );
        let batch = vec![
            json!({ "id": 1, "message": "a" }),
            json!({ "id": 1, "message": "duplicate" }),
        ];

        let err = db.execute_batch(&query, &batch).unwrap_err();
        assert!(format!("{:#}", err).contains("record 1"));
        assert!(rows(&db).is_empty());
    }

    #[test]
    fn test_positional_count_mismatch() {
        let db = logs_db();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message) VALUES (?, ?)",
            ParameterMapping::Record,
        );

        let err = db.execute_batch(&query, &[json!([1])]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MappingError>(),
            Some(&MappingError::ParameterCount { expected: 2, supplied: 1 })
        );
    }

    #[test]
    fn test_named_bindings_need_named_placeholders() {
        let db = logs_db();
        let query = InsertQuery::new("INSERT INTO logs (id) VALUES (?)", ParameterMapping::Record);

        let err = db.execute_batch(&query, &[json!({ "id": 1 })]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MappingError>(),
            Some(&MappingError::UnnamedParameter(1))
        );
    }

    #[test]
    fn test_named_bindings_reject_numbered_placeholders() {
        let db = logs_db();
        let query = InsertQuery::new(
            "INSERT INTO logs (id, message) VALUES (?1, ?2)",
            ParameterMapping::Record,
        );

        let err = db
            .execute_batch(&query, &[json!({ "id": 1, "message": "lost" })])
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<MappingError>(),
            Some(&MappingError::UnnamedParameter(1))
        );
        assert!(rows(&db).is_empty());
    }

    #[test]
    fn test_invalid_sql_is_reported() {
        let db = logs_db();
        let query = InsertQuery::new("INSERT INTO nowhere VALUES (?)", ParameterMapping::Record);

        let err = db.execute_batch(&query, &[json!(1)]).unwrap_err();
        assert!(err.to_string().contains("Failed to prepare query"));
    }
}
