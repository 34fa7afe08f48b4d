//! In-memory schema reader
//!
//! Serves a schema held entirely in memory. Every call is recorded so callers
//! can assert which catalog queries a run performed.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::DbTblError;
use crate::introspect::SchemaReader;
use crate::schema::{EnumValue, ForeignKey, TableDescriptor};

#[derive(Debug, Clone, Default)]
pub struct MemorySchemaReader {
    database: String,
    tables: BTreeMap<String, TableDescriptor>,
    foreign_keys: Vec<ForeignKey>,
    calls: Vec<String>,
}

impl MemorySchemaReader {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn remove_table(&mut self, table: &str) -> Option<TableDescriptor> {
        self.foreign_keys
            .retain(|fk| fk.from_table != table && fk.to_table != table);
        self.tables.remove(table)
    }

    pub fn table_mut(&mut self, table: &str) -> Option<&mut TableDescriptor> {
        self.tables.get_mut(table)
    }

    /// Calls made so far, e.g. `list_columns(users)`
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    fn record(&mut self, call: String) {
        trace!(call = ?call, "Memory reader call");
        self.calls.push(call);
    }

    fn table(&self, table: &str) -> Result<&TableDescriptor, DbTblError> {
        self.tables
            .get(table)
            .ok_or_else(|| DbTblError::UnknownTable {
                database: self.database.clone(),
                table: table.to_string(),
            })
    }
}

impl SchemaReader for MemorySchemaReader {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DbTblError> {
        self.record("list_tables".to_string());
        Ok(self.tables.keys().cloned().collect())
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<String>, DbTblError> {
        self.record(format!("list_columns({})", table));
        Ok(self.table(table)?.columns.clone())
    }

    fn list_enums(&mut self, table: &str) -> Result<Vec<EnumValue>, DbTblError> {
        self.record(format!("list_enums({})", table));
        Ok(self.table(table)?.enums.clone())
    }

    fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKey>, DbTblError> {
        self.record("list_foreign_keys".to_string());
        Ok(self.foreign_keys.clone())
    }
}
