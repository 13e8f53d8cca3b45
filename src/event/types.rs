use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Column name to value map for one row image.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A point in the source database's replication log.
///
/// Positions order by log file name first and byte offset second, which matches
/// the way binlog files are rotated (`mysql-bin.000041` before
/// `mysql-bin.000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinlogPosition {
    pub file: String,
    pub offset: u64,
}

impl BinlogPosition {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }
}

impl Ord for BinlogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .cmp(&other.file)
            .then(self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for BinlogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

impl FromStr for BinlogPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (file, offset) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidPosition(format!("missing ':' in '{}'", s)))?;
        if file.is_empty() {
            return Err(Error::InvalidPosition(format!("empty file name in '{}'", s)));
        }
        let offset = offset
            .parse::<u64>()
            .map_err(|e| Error::InvalidPosition(format!("bad offset in '{}': {}", s, e)))?;
        Ok(Self::new(file, offset))
    }
}

/// Where a change came from: schema identity plus log position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    pub database: String,
    pub table: String,
    pub position: BinlogPosition,
}

impl EventSource {
    pub fn new(database: impl Into<String>, table: impl Into<String>, position: BinlogPosition) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            position,
        }
    }
}

/// Fully qualified target table a statement is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// One row-level mutation read from the source log.
///
/// Events are moved through the pipeline and never copied, so the type is
/// deliberately not `Clone`. On the wire each event is a JSON object tagged by
/// `op`:
///
/// ```json
/// {"op":"INSERT","database":"shop","table":"orders",
///  "position":{"file":"mysql-bin.000003","offset":1542},
///  "after":{"id":7,"total":"19.99"}}
/// ```
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert {
        #[serde(flatten)]
        source: EventSource,
        after: Row,
    },
    Update {
        #[serde(flatten)]
        source: EventSource,
        before: Row,
        after: Row,
    },
    Delete {
        #[serde(flatten)]
        source: EventSource,
        before: Row,
    },
}

impl ChangeEvent {
    pub fn insert(source: EventSource, after: Row) -> Self {
        ChangeEvent::Insert { source, after }
    }

    pub fn update(source: EventSource, before: Row, after: Row) -> Self {
        ChangeEvent::Update {
            source,
            before,
            after,
        }
    }

    pub fn delete(source: EventSource, before: Row) -> Self {
        ChangeEvent::Delete { source, before }
    }

    pub fn source(&self) -> &EventSource {
        match self {
            ChangeEvent::Insert { source, .. }
            | ChangeEvent::Update { source, .. }
            | ChangeEvent::Delete { source, .. } => source,
        }
    }

    pub fn database(&self) -> &str {
        &self.source().database
    }

    pub fn table(&self) -> &str {
        &self.source().table
    }

    pub fn position(&self) -> &BinlogPosition {
        &self.source().position
    }

    pub fn op(&self) -> ChangeOperation {
        match self {
            ChangeEvent::Insert { .. } => ChangeOperation::Insert,
            ChangeEvent::Update { .. } => ChangeOperation::Update,
            ChangeEvent::Delete { .. } => ChangeOperation::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_position_ordering() {
        let a = BinlogPosition::new("mysql-bin.000001", 900);
        let b = BinlogPosition::new("mysql-bin.000002", 4);
        let c = BinlogPosition::new("mysql-bin.000002", 120);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(c.clone().max(a.clone()), c);
    }

    #[test]
    fn test_position_parse_and_display() {
        let pos: BinlogPosition = "mysql-bin.000007:4096".parse().unwrap();
        assert_eq!(pos, BinlogPosition::new("mysql-bin.000007", 4096));
        assert_eq!(pos.to_string(), "mysql-bin.000007:4096");

        assert!("no-offset".parse::<BinlogPosition>().is_err());
        assert!(":12".parse::<BinlogPosition>().is_err());
        assert!("file:abc".parse::<BinlogPosition>().is_err());
    }

    #[test]
    fn test_event_json_format() {
        let line = r#"{"op":"UPDATE","database":"shop","table":"orders",
            "position":{"file":"mysql-bin.000003","offset":1542},
            "before":{"id":7,"total":"10.00"},"after":{"id":7,"total":"19.99"}}"#;

        let event: ChangeEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.op(), ChangeOperation::Update);
        assert_eq!(event.database(), "shop");
        assert_eq!(event.table(), "orders");
        assert_eq!(event.position(), &BinlogPosition::new("mysql-bin.000003", 1542));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["op"], "UPDATE");
        assert_eq!(value["after"], json!({"id": 7, "total": "19.99"}));
    }

    #[test]
    fn test_event_json_rejects_missing_image() {
        let line = r#"{"op":"DELETE","database":"shop","table":"orders",
            "position":{"file":"mysql-bin.000003","offset":1}}"#;
        assert!(serde_json::from_str::<ChangeEvent>(line).is_err());
    }
}
