//! Rendering of change events into PostgreSQL statements.
//!
//! Each variant has its own rule:
//!
//! - insert: `INSERT INTO .. (cols) VALUES (..) ON CONFLICT DO NOTHING`
//! - update: `UPDATE .. SET .. WHERE <old row>`
//! - delete: `DELETE FROM .. WHERE <old row>`
//!
//! The `WHERE` predicate matches on every column of the old row image, using
//! `IS NULL` for null values, so replaying an already applied update or delete
//! matches nothing.

use postgres_protocol::escape::{escape_identifier, escape_literal};
use serde_json::Value;

use super::types::{ChangeEvent, Row, TableRef};
use crate::{Error, Result};

impl ChangeEvent {
    /// Renders this event as a single statement addressed to `target`.
    ///
    /// The returned statement carries no terminator.
    pub fn as_sql(&self, target: &TableRef) -> Result<String> {
        let table = qualified_name(target);

        match self {
            ChangeEvent::Insert { after, .. } => {
                self.require_image(target, "after", after)?;
                let columns: Vec<String> = after.keys().map(|c| escape_identifier(c)).collect();
                let values: Vec<String> = after.values().map(render_value).collect();
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
                    table,
                    columns.join(","),
                    values.join(",")
                ))
            }
            ChangeEvent::Update { before, after, .. } => {
                self.require_image(target, "before", before)?;
                self.require_image(target, "after", after)?;
                let assignments: Vec<String> = after
                    .iter()
                    .map(|(column, value)| {
                        format!("{}={}", escape_identifier(column), render_value(value))
                    })
                    .collect();
                Ok(format!(
                    "UPDATE {} SET {} WHERE {}",
                    table,
                    assignments.join(","),
                    row_predicate(before)
                ))
            }
            ChangeEvent::Delete { before, .. } => {
                self.require_image(target, "before", before)?;
                Ok(format!("DELETE FROM {} WHERE {}", table, row_predicate(before)))
            }
        }
    }

    fn require_image(&self, target: &TableRef, image: &str, row: &Row) -> Result<()> {
        if row.is_empty() {
            return Err(Error::Render {
                database: target.schema.clone(),
                table: target.name.clone(),
                message: format!(
                    "{:?} event at {} has an empty {} image",
                    self.op(),
                    self.position(),
                    image
                ),
            });
        }
        Ok(())
    }
}

fn qualified_name(target: &TableRef) -> String {
    format!(
        "{}.{}",
        escape_identifier(&target.schema),
        escape_identifier(&target.name)
    )
}

fn row_predicate(row: &Row) -> String {
    row.iter()
        .map(|(column, value)| match value {
            Value::Null => format!("{} IS NULL", escape_identifier(column)),
            _ => format!("{}={}", escape_identifier(column), render_value(value)),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_literal(s),
        // Arrays and objects land in json/jsonb columns as text.
        other => escape_literal(&other.to_string()),
    }
}
