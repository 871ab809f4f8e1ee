//! Populate a database from a YAML "scenario" file.
//!
//! Top-level keys are table names; each holds a list of rows whose keys are
//! column names:
//!
//! ```yaml
//! users:
//!   - id: 1
//!     name: Alice
//!     email: alice@example.com
//!   - id: 2
//!     name: Bob
//!
//! posts:
//!   - user_id: 1
//!     title: Hello, world!
//!     is_draft: true
//! ```
//!
//! Tables are loaded in the order they appear, so parents go before children.
//! Columns missing from a row are left out of its INSERT and take their
//! column default. Each row is bound as one JSON parameter and expanded
//! server-side with `json_populate_record`, which converts values with the
//! column type's own input function.

use std::path::Path;

use serde_yml::Value;

use crate::db::SqlExecutor;
use crate::error::ScenarioError;

/// One row to insert: ordered column names and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub table: String,
    pub columns: Vec<String>,
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl Row {
    /// The INSERT statement for this row. `$1` is the row as a JSON object.
    pub fn insert_sql(&self) -> String {
        let table = quote_ident(&self.table);
        if self.columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", table);
        }
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM json_populate_record(NULL::{table}, $1)"
        )
    }
}

/// Quote a SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn key_name(key: &Value, what: &str) -> Result<String, ScenarioError> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| ScenarioError::Shape {
            reason: format!("{} names must be strings, got {:?}", what, key),
        })
}

/// Turn a parsed scenario document into rows, in document order.
pub fn rows_from_value(doc: Value) -> Result<Vec<Row>, ScenarioError> {
    let tables = match doc {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(m) => m,
        other => {
            return Err(ScenarioError::Shape {
                reason: format!("expected a mapping of table names, got {:?}", other),
            });
        }
    };

    let mut rows = Vec::new();
    for (table, table_rows) in tables {
        let table = key_name(&table, "table")?;
        let table_rows = match table_rows {
            Value::Null => continue,
            Value::Sequence(seq) => seq,
            other => {
                return Err(ScenarioError::Shape {
                    reason: format!("table '{}' must hold a list of rows, got {:?}", table, other),
                });
            }
        };

        for row in table_rows {
            let Value::Mapping(fields) = row else {
                return Err(ScenarioError::Shape {
                    reason: format!("rows of '{}' must be mappings", table),
                });
            };

            let mut columns = Vec::with_capacity(fields.len());
            let mut values = serde_json::Map::new();
            for (column, value) in fields {
                let column = key_name(&column, "column")?;
                let value = serde_json::to_value(&value).map_err(|e| ScenarioError::Shape {
                    reason: format!("value of '{}.{}' cannot be bound: {}", table, column, e),
                })?;
                values.insert(column.clone(), value);
                columns.push(column);
            }

            rows.push(Row {
                table: table.clone(),
                columns,
                values,
            });
        }
    }
    Ok(rows)
}

/// Read `path` and insert every row it describes, stopping at the first
/// failure. Returns the number of rows inserted.
pub async fn load_scenario(
    db: &dyn SqlExecutor,
    path: impl AsRef<Path>,
) -> Result<usize, ScenarioError> {
    let path = path.as_ref();
    let yaml = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let doc: Value = serde_yml::from_str(&yaml).map_err(|source| ScenarioError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let rows = rows_from_value(doc)?;
    for row in &rows {
        insert_row(db, row).await?;
    }

    tracing::info!(file = %path.display(), rows = rows.len(), "Loaded scenario");
    Ok(rows.len())
}

async fn insert_row(db: &dyn SqlExecutor, row: &Row) -> Result<(), ScenarioError> {
    let sql = row.insert_sql();
    let result = if row.columns.is_empty() {
        db.execute(&sql, &[]).await
    } else {
        let record = serde_json::Value::Object(row.values.clone());
        db.execute(&sql, &[&record]).await
    };

    result.map(|_| ()).map_err(|source| ScenarioError::Exec {
        table: row.table.clone(),
        source,
    })
}
