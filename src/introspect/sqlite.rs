use std::path::Path;

use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, error, info, trace};

use super::enums::{check_constraints, order_by_columns, parse_check_in_lists};
use super::SchemaReader;
use crate::config::DbConfig;
use crate::error::DbTblError;
use crate::schema::{EnumValue, ForeignKey};

/// SQLite schema reader
pub struct SqliteSchemaReader {
    conn: Connection,
    database: String,
}

impl SqliteSchemaReader {
    /// Open the database file named in the configuration, read-only
    pub fn connect(config: &DbConfig) -> Result<Self, DbTblError> {
        Self::open(&config.path, &config.database_name())
    }

    pub fn open(path: &Path, database: &str) -> Result<Self, DbTblError> {
        info!(path = ?path, "Opening SQLite database");

        // never let the driver create an empty database file
        if !path.is_file() {
            error!(path = ?path, "SQLite database file not found");
            return Err(DbTblError::UnknownDatabase(path.display().to_string()));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            error!(path = ?path, error = ?e, "Failed to open SQLite database");
            DbTblError::Connection(e.to_string())
        })?;

        Ok(Self::from_connection(conn, database))
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection, database: impl Into<String>) -> Self {
        Self {
            conn,
            database: database.into(),
        }
    }

    fn query_strings(
        &self,
        sql: &str,
        param: Option<&str>,
        what: &str,
    ) -> Result<Vec<String>, DbTblError> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| self.error(what, e))?;
        let values = stmt
            .query_map(params_from_iter(param), |row| row.get::<_, String>(0))
            .map_err(|e| self.error(what, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.error(what, e))?;
        Ok(values)
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>, DbTblError> {
        self.query_strings(
            "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
            Some(table),
            "Failed to query primary key",
        )
    }

    fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, DbTblError> {
        let what = "Failed to query foreign keys";
        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT "seq", "table", "from", "to"
                   FROM pragma_foreign_key_list(?1)
                   ORDER BY "id", "seq""#,
            )
            .map_err(|e| self.error(what, e))?;

        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| self.error(what, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.error(what, e))?;

        let mut fks = Vec::with_capacity(rows.len());
        for (seq, to_table, from_column, to_column) in rows {
            // `REFERENCES users` without a column list points at the primary key
            let to_column = match to_column {
                Some(column) => column,
                None => {
                    let pk = self.primary_key(&to_table)?;
                    let idx = usize::try_from(seq).unwrap_or(0);
                    pk.get(idx).cloned().unwrap_or_else(|| "rowid".to_string())
                }
            };

            fks.push(ForeignKey {
                from_table: table.to_string(),
                from_column,
                to_table,
                to_column,
            });
        }
        Ok(fks)
    }

    fn error(&self, what: &str, e: rusqlite::Error) -> DbTblError {
        DbTblError::Introspection {
            database: self.database.clone(),
            message: format!("{}: {}", what, e),
        }
    }
}

impl SchemaReader for SqliteSchemaReader {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DbTblError> {
        trace!(database = ?self.database, "Querying tables");

        let tables = self.query_strings(
            r"SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\' ORDER BY name",
            None,
            "Failed to query tables",
        )?;
        debug!(count = tables.len(), "Found tables");
        Ok(tables)
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<String>, DbTblError> {
        trace!(table = ?table, "Querying columns");

        let columns = self.query_strings(
            "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
            Some(table),
            "Failed to query columns",
        )?;

        // an unknown table yields an empty pragma result rather than an error
        if columns.is_empty() {
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
        let what = "Failed to read table definition";

        let create_sql: Option<String> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.error(what, e))?
            .flatten();

        let Some(create_sql) = create_sql else {
            return Ok(Vec::new());
        };

        let found = check_constraints(&create_sql)
            .iter()
            .flat_map(|expr| parse_check_in_lists(expr))
            .collect();

        let enums = order_by_columns(&columns, found);
        trace!(table = ?table, enums = enums.len(), "Found enum values");
        Ok(enums)
    }

    fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKey>, DbTblError> {
        let mut fks = Vec::new();
        for table in self.list_tables()? {
            fks.extend(self.table_foreign_keys(&table)?);
        }
        debug!(count = fks.len(), "Found foreign keys");
        Ok(fks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> SqliteSchemaReader {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('admin', 'member'))
            );
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                approver_id INTEGER REFERENCES users,
                status TEXT CHECK(status IN ('new','paid','shipped')),
                total REAL
            );
            "#,
        )
        .unwrap();
        SqliteSchemaReader::from_connection(conn, "shop")
    }

    #[test]
    fn test_list_tables_sorted() {
        let mut reader = reader();
        assert_eq!(reader.list_tables().unwrap(), vec!["orders", "users"]);
        assert_eq!(reader.database_name(), "shop");
    }

    #[test]
    fn test_list_tables_keeps_sqlite_lookalikes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sqlites (id INTEGER PRIMARY KEY);
            CREATE TABLE SQLiteBackups (id INTEGER PRIMARY KEY);
            CREATE TABLE plain (id INTEGER PRIMARY KEY AUTOINCREMENT);
            INSERT INTO plain DEFAULT VALUES;
            "#,
        )
        .unwrap();
        let mut reader = SqliteSchemaReader::from_connection(conn, "shop");

        // AUTOINCREMENT creates sqlite_sequence, which stays hidden
        assert_eq!(
            reader.list_tables().unwrap(),
            vec!["SQLiteBackups", "plain", "sqlites"]
        );
    }

    #[test]
    fn test_list_enums_from_table_check_with_several_lists() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE shipments (
                id INTEGER PRIMARY KEY,
                carrier TEXT,
                speed TEXT,
                CHECK (carrier IN ('ups', 'dhl') AND speed IN ('slow', 'fast'))
            );
            "#,
        )
        .unwrap();
        let mut reader = SqliteSchemaReader::from_connection(conn, "shop");

        let keys: Vec<_> = reader
            .list_enums("shipments")
            .unwrap()
            .iter()
            .map(|e| e.key())
            .collect();
        assert_eq!(keys, vec!["carrier_ups", "carrier_dhl", "speed_slow", "speed_fast"]);
    }

    #[test]
    fn test_list_columns_declaration_order() {
        let mut reader = reader();
        assert_eq!(
            reader.list_columns("orders").unwrap(),
            vec!["id", "user_id", "approver_id", "status", "total"]
        );
    }

    #[test]
    fn test_unknown_table() {
        let mut reader = reader();
        let err = reader.list_columns("missing").unwrap_err();
        assert!(matches!(err, DbTblError::UnknownTable { .. }));
    }

    #[test]
    fn test_list_enums_from_check_constraints() {
        let mut reader = reader();
        let keys: Vec<_> = reader
            .list_enums("orders")
            .unwrap()
            .iter()
            .map(|e| e.key())
            .collect();
        assert_eq!(keys, vec!["status_new", "status_paid", "status_shipped"]);

        let users = reader.list_enums("users").unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].column, "role");
    }

    #[test]
    fn test_list_foreign_keys_resolves_implicit_column() {
        let mut reader = reader();
        let mut fks = reader.list_foreign_keys().unwrap();
        fks.sort();

        assert_eq!(
            fks,
            vec![
                ForeignKey::new("orders", "approver_id", "users", "id"),
                ForeignKey::new("orders", "user_id", "users", "id"),
            ]
        );
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteSchemaReader::open(&dir.path().join("nope.sqlite"), "nope");
        assert!(matches!(result, Err(DbTblError::UnknownDatabase(_))));
    }
}
