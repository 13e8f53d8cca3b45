use std::collections::HashMap;

use crate::event::{ChangeEvent, TableRef};

/// Source to target renames applied when rendering statements.
///
/// Names without an entry are used unchanged.
#[derive(Debug, Clone, Default)]
pub struct Rewrites {
    databases: HashMap<String, String>,
    tables: HashMap<String, String>,
}

impl Rewrites {
    pub fn new(databases: HashMap<String, String>, tables: HashMap<String, String>) -> Self {
        Self { databases, tables }
    }

    pub fn database<'a>(&'a self, source: &'a str) -> &'a str {
        self.databases.get(source).map_or(source, String::as_str)
    }

    pub fn table<'a>(&'a self, source: &'a str) -> &'a str {
        self.tables.get(source).map_or(source, String::as_str)
    }

    /// Target table for `event`.
    pub fn resolve(&self, event: &ChangeEvent) -> TableRef {
        TableRef::new(self.database(event.database()), self.table(event.table()))
    }
}
