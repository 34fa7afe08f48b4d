use postgres::{Client, NoTls};
use tracing::{debug, error, info, trace};

use super::enums::{check_constraints, order_by_columns, parse_check_in_lists};
use super::SchemaReader;
use crate::config::DbConfig;
use crate::error::DbTblError;
use crate::schema::{EnumValue, ForeignKey};

/// PostgreSQL schema reader
///
/// Reads one namespace (`database.schema`, usually `public`) of the connected database.
pub struct PostgresSchemaReader {
    client: Client,
    database: String,
    schema: String,
}

impl PostgresSchemaReader {
    /// Connect using the database section of the configuration
    pub fn connect(config: &DbConfig) -> Result<Self, DbTblError> {
        info!(connection = ?config.redacted_connection_string(), "Connecting to PostgreSQL");

        let client =
            Client::connect(&config.postgres_connection_string(), NoTls).map_err(|e| {
                error!(error = ?e, "PostgreSQL connection failed");
                classify_connect_error(&config.name, e)
            })?;

        Self::new(client, &config.name, &config.schema)
    }

    /// Wrap an existing client. Fails if `schema` does not exist.
    pub fn new(mut client: Client, database: &str, schema: &str) -> Result<Self, DbTblError> {
        let rows = client
            .query("SELECT 1 FROM pg_namespace WHERE nspname = $1", &[&schema])
            .map_err(|e| introspection_error(database, "Failed to look up schema", e))?;

        if rows.is_empty() {
            error!(schema = ?schema, "Schema not found");
            return Err(DbTblError::UnknownDatabase(format!("{}.{}", database, schema)));
        }

        info!(database = ?database, schema = ?schema, "Connected to database");

        Ok(Self {
            client,
            database: database.to_string(),
            schema: schema.to_string(),
        })
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, DbTblError> {
        let sql = r#"
            SELECT 1
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p')
                AND c.relname = $1
                AND n.nspname = $2
        "#;

        let rows = self
            .client
            .query(sql, &[&table, &self.schema])
            .map_err(|e| introspection_error(&self.database, "Failed to look up table", e))?;
        Ok(!rows.is_empty())
    }

    fn native_enums(&mut self, table: &str) -> Result<Vec<(String, Vec<String>)>, DbTblError> {
        let sql = r#"
            SELECT
                a.attname AS column_name,
                e.enumlabel AS enum_value
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_enum e ON e.enumtypid = a.atttypid
            WHERE c.relname = $1
                AND n.nspname = $2
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum, e.enumsortorder
        "#;

        let rows = self
            .client
            .query(sql, &[&table, &self.schema])
            .map_err(|e| introspection_error(&self.database, "Failed to query enum columns", e))?;

        // Group enum labels by column
        let mut found: Vec<(String, Vec<String>)> = Vec::new();
        for row in rows {
            let column: String = row.get("column_name");
            let value: String = row.get("enum_value");

            match found.iter().position(|(c, _)| *c == column) {
                Some(idx) => found[idx].1.push(value),
                None => found.push((column, vec![value])),
            }
        }
        Ok(found)
    }

    fn checked_enums(&mut self, table: &str) -> Result<Vec<(String, Vec<String>)>, DbTblError> {
        let sql = r#"
            SELECT pg_get_constraintdef(con.oid) AS definition
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE con.contype = 'c'
                AND c.relname = $1
                AND n.nspname = $2
            ORDER BY con.conname
        "#;

        let rows = self
            .client
            .query(sql, &[&table, &self.schema])
            .map_err(|e| {
                introspection_error(&self.database, "Failed to query check constraints", e)
            })?;

        let mut found = Vec::new();
        for row in rows {
            let definition: String = row.get("definition");
            trace!(table = ?table, definition = ?definition, "Check constraint");
            found.extend(
                check_constraints(&definition)
                    .iter()
                    .flat_map(|expr| parse_check_in_lists(expr)),
            );
        }
        Ok(found)
    }
}

impl SchemaReader for PostgresSchemaReader {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DbTblError> {
        trace!(schema = ?self.schema, "Querying tables");

        let sql = r#"
            SELECT c.relname AS table_name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p')
                AND NOT c.relispartition
                AND n.nspname = $1
            ORDER BY c.relname
        "#;

        let rows = self
            .client
            .query(sql, &[&self.schema])
            .map_err(|e| introspection_error(&self.database, "Failed to query tables", e))?;

        let tables: Vec<String> = rows.iter().map(|row| row.get("table_name")).collect();
        debug!(count = tables.len(), "Found tables");
        Ok(tables)
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<String>, DbTblError> {
        trace!(schema = ?self.schema, table = ?table, "Querying columns");

        let sql = r#"
            SELECT a.attname AS column_name
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relname = $1
                AND n.nspname = $2
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = self
            .client
            .query(sql, &[&table, &self.schema])
            .map_err(|e| {
                error!(table = ?table, error = ?e, "Failed to query columns");
                introspection_error(&self.database, "Failed to query columns", e)
            })?;

        let columns: Vec<String> = rows.iter().map(|row| row.get("column_name")).collect();

        // zero-column tables are legal in PostgreSQL, so confirm before failing
        if columns.is_empty() && !self.table_exists(table)? {
            return Err(DbTblError::UnknownTable {
                database: self.database.clone(),
                table: table.to_string(),
            });
        }

        trace!(table = ?table, columns = ?columns, "Found columns");
        Ok(columns)
    }

    fn list_enums(&mut self, table: &str) -> Result<Vec<EnumValue>, DbTblError> {
        let columns = self.list_columns(table)?;

        let mut found = self.native_enums(table)?;
        found.extend(self.checked_enums(table)?);

        let enums = order_by_columns(&columns, found);
        trace!(table = ?table, enums = enums.len(), "Found enum values");
        Ok(enums)
    }

    fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKey>, DbTblError> {
        trace!(schema = ?self.schema, "Querying foreign keys");

        let sql = r#"
            SELECT
                cl.relname AS from_table,
                att.attname AS from_column,
                fcl.relname AS to_table,
                fatt.attname AS to_column
            FROM pg_constraint con
            JOIN pg_class cl ON cl.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = cl.relnamespace
            JOIN pg_class fcl ON fcl.oid = con.confrelid
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(col, fcol)
            JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.col
            JOIN pg_attribute fatt ON fatt.attrelid = con.confrelid AND fatt.attnum = k.fcol
            WHERE con.contype = 'f'
                AND n.nspname = $1
            ORDER BY from_table, from_column
        "#;

        let rows = self
            .client
            .query(sql, &[&self.schema])
            .map_err(|e| introspection_error(&self.database, "Failed to query foreign keys", e))?;

        let fks: Vec<ForeignKey> = rows
            .iter()
            .map(|row| ForeignKey {
                from_table: row.get("from_table"),
                from_column: row.get("from_column"),
                to_table: row.get("to_table"),
                to_column: row.get("to_column"),
            })
            .collect();

        debug!(count = fks.len(), "Found foreign keys");
        Ok(fks)
    }
}

fn introspection_error(database: &str, what: &str, e: postgres::Error) -> DbTblError {
    DbTblError::Introspection {
        database: database.to_string(),
        message: format!("{}: {}", what, e),
    }
}

/// Tell "database does not exist" (SQLSTATE 3D000) apart from other connect failures
fn classify_connect_error(database: &str, e: postgres::Error) -> DbTblError {
    match e.code() {
        Some(code) if *code == postgres::error::SqlState::INVALID_CATALOG_NAME => {
            DbTblError::UnknownDatabase(database.to_string())
        }
        _ => DbTblError::Connection(e.to_string()),
    }
}
