//! Schema data structures
//!
//! These types represent database schema information and form the contract
//! between introspection (produces) and code generation (consumes).

use std::collections::BTreeMap;

/// A table as read from the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    /// Column names in catalog declaration order
    pub columns: Vec<String>,
    /// Enum literals, ordered by column declaration and then by value order
    pub enums: Vec<EnumValue>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            enums: Vec::new(),
        }
    }

    pub fn with_enums(mut self, enums: Vec<EnumValue>) -> Self {
        self.enums = enums;
        self
    }

    /// Enum values grouped by originating column, in first-appearance order
    pub fn enum_groups(&self) -> Vec<(&str, Vec<&EnumValue>)> {
        let mut groups: Vec<(&str, Vec<&EnumValue>)> = Vec::new();
        for value in &self.enums {
            match groups.iter().position(|(column, _)| *column == value.column) {
                Some(idx) => groups[idx].1.push(value),
                None => groups.push((value.column.as_str(), vec![value])),
            }
        }
        groups
    }
}

/// One allowed literal of an enum (or enum-like CHECK constrained) column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub column: String,
    pub value: String,
}

impl EnumValue {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Synthetic constant key, e.g. `status_active`
    pub fn key(&self) -> String {
        format!("{}_{}", self.column, self.value)
    }
}

/// A single-column foreign key reference
///
/// Field order matters: the derived `Ord` is the natural tuple order used to
/// sort foreign keys before hashing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl ForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }
}

/// Normalized, sorted view of a schema. Only used as hash input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub database: String,
    pub tables: BTreeMap<String, Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl SchemaSnapshot {
    /// Build a snapshot; tables without columns are left out
    pub fn new(database: &str, tables: &[TableDescriptor], foreign_keys: &[ForeignKey]) -> Self {
        let tables = tables
            .iter()
            .filter(|t| !t.columns.is_empty())
            .map(|t| (t.name.clone(), t.columns.clone()))
            .collect();

        let mut foreign_keys = foreign_keys.to_vec();
        foreign_keys.sort();

        Self {
            database: database.to_string(),
            tables,
            foreign_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_enum_key() {
        let value = EnumValue::new("status", "active");
        assert_eq!(value.key(), "status_active");
    }

    #[test]
    fn test_enum_groups_keep_column_order() {
        let table = TableDescriptor::new("orders", columns(&["id", "status", "kind"])).with_enums(
            vec![
                EnumValue::new("status", "new"),
                EnumValue::new("status", "paid"),
                EnumValue::new("kind", "retail"),
            ],
        );

        let groups = table.enum_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "status");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "kind");
        assert_eq!(groups[0].1[1].key(), "status_paid");
    }

    #[test]
    fn test_snapshot_sorts_tables_and_foreign_keys() {
        let tables = vec![
            TableDescriptor::new("users", columns(&["id"])),
            TableDescriptor::new("orders", columns(&["id", "user_id"])),
        ];
        let fks = vec![
            ForeignKey::new("orders", "user_id", "users", "id"),
            ForeignKey::new("invoices", "order_id", "orders", "id"),
        ];

        let snapshot = SchemaSnapshot::new("shop", &tables, &fks);

        let names: Vec<_> = snapshot.tables.keys().cloned().collect();
        assert_eq!(names, vec!["orders", "users"]);
        assert_eq!(snapshot.foreign_keys[0].from_table, "invoices");
    }

    #[test]
    fn test_snapshot_skips_tables_without_columns() {
        let tables = vec![
            TableDescriptor::new("empty", vec![]),
            TableDescriptor::new("users", columns(&["id"])),
        ];

        let snapshot = SchemaSnapshot::new("shop", &tables, &[]);

        assert!(!snapshot.tables.contains_key("empty"));
        assert!(snapshot.tables.contains_key("users"));
    }
}
