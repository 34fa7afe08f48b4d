use mysql_async::{prelude::Queryable, Conn, OptsBuilder};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, trace};

use super::enums::{order_by_columns, parse_check_in_lists, parse_enum_column_type};
use super::SchemaReader;
use crate::config::DbConfig;
use crate::error::DbTblError;
use crate::schema::{EnumValue, ForeignKey};

/// MySQL / MariaDB schema reader
///
/// The driver is async; every query is driven to completion on a private
/// current-thread runtime so the reader stays synchronous like the others.
pub struct MySqlSchemaReader {
    // dropped before the runtime it was created on
    conn: Conn,
    runtime: Runtime,
    database: String,
}

impl MySqlSchemaReader {
    pub fn connect(config: &DbConfig) -> Result<Self, DbTblError> {
        info!(connection = ?config.redacted_connection_string(), "Connecting to MySQL");

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbTblError::Connection(format!("Failed to start MySQL runtime: {}", e)))?;

        // Connect without selecting a database so a missing one is reported as such
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port_or_default())
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()));

        let conn = runtime.block_on(Conn::new(opts)).map_err(|e| {
            error!(error = ?e, "MySQL connection failed");
            DbTblError::Connection(e.to_string())
        })?;

        let mut reader = Self {
            conn,
            runtime,
            database: config.name.clone(),
        };
        reader.ensure_database()?;

        info!(database = ?reader.database, "Connected to database");
        Ok(reader)
    }

    fn ensure_database(&mut self) -> Result<(), DbTblError> {
        let sql = "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";
        let found: Vec<String> = self.exec(sql, (self.database.clone(),), "Failed to look up database")?;

        if found.is_empty() {
            error!(database = ?self.database, "Database not found");
            return Err(DbTblError::UnknownDatabase(self.database.clone()));
        }
        Ok(())
    }

    fn exec<T, P>(&mut self, sql: &str, params: P, what: &str) -> Result<Vec<T>, DbTblError>
    where
        T: mysql_async::prelude::FromRow + Send + 'static,
        P: Into<mysql_async::Params> + Send,
    {
        let Self {
            conn,
            runtime,
            database,
        } = self;

        runtime
            .block_on(conn.exec(sql, params))
            .map_err(|e| DbTblError::Introspection {
                database: database.clone(),
                message: format!("{}: {}", what, e),
            })
    }

    fn checked_enums(&mut self, table: &str) -> Result<Vec<(String, Vec<String>)>, DbTblError> {
        let sql = r#"
            SELECT cc.CHECK_CLAUSE
            FROM information_schema.CHECK_CONSTRAINTS cc
            JOIN information_schema.TABLE_CONSTRAINTS tc
                ON tc.CONSTRAINT_SCHEMA = cc.CONSTRAINT_SCHEMA
                AND tc.CONSTRAINT_NAME = cc.CONSTRAINT_NAME
            WHERE tc.TABLE_SCHEMA = ?
                AND tc.TABLE_NAME = ?
                AND tc.CONSTRAINT_TYPE = 'CHECK'
            ORDER BY cc.CONSTRAINT_NAME
        "#;

        let clauses: Vec<String> = self.exec(
            sql,
            (self.database.clone(), table.to_string()),
            "Failed to query check constraints",
        )?;

        Ok(clauses
            .iter()
            .inspect(|clause| trace!(table = ?table, clause = ?clause, "Check constraint"))
            .flat_map(|clause| parse_check_in_lists(clause))
            .collect())
    }
}

impl SchemaReader for MySqlSchemaReader {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DbTblError> {
        trace!(database = ?self.database, "Querying tables");

        let sql = r#"
            SELECT TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
                AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let tables: Vec<String> =
            self.exec(sql, (self.database.clone(),), "Failed to query tables")?;
        debug!(count = tables.len(), "Found tables");
        Ok(tables)
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<String>, DbTblError> {
        trace!(database = ?self.database, table = ?table, "Querying columns");

        let sql = r#"
            SELECT COLUMN_NAME
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ?
                AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let columns: Vec<String> = self.exec(
            sql,
            (self.database.clone(), table.to_string()),
            "Failed to query columns",
        )?;

        // MySQL tables always have at least one column
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

        let sql = r#"
            SELECT COLUMN_NAME, COLUMN_TYPE
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ?
                AND TABLE_NAME = ?
                AND DATA_TYPE IN ('enum', 'set')
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String)> = self.exec(
            sql,
            (self.database.clone(), table.to_string()),
            "Failed to query enum columns",
        )?;

        let mut found: Vec<(String, Vec<String>)> = rows
            .into_iter()
            .map(|(column, column_type)| {
                trace!(column = ?column, column_type = ?column_type, "Enum column");
                (column, parse_enum_column_type(&column_type))
            })
            .collect();

        match self.checked_enums(table) {
            Ok(checked) => found.extend(checked),
            // servers before 8.0.16 have no CHECK_CONSTRAINTS view
            Err(e) => debug!(table = ?table, error = %e, "Skipping check constraints"),
        }

        let enums = order_by_columns(&columns, found);
        trace!(table = ?table, enums = enums.len(), "Found enum values");
        Ok(enums)
    }

    fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKey>, DbTblError> {
        trace!(database = ?self.database, "Querying foreign keys");

        let sql = r#"
            SELECT TABLE_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
                AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY TABLE_NAME, COLUMN_NAME
        "#;

        let rows: Vec<(String, String, String, String)> = self.exec(
            sql,
            (self.database.clone(),),
            "Failed to query foreign keys",
        )?;

        let fks: Vec<ForeignKey> = rows
            .into_iter()
            .map(|(from_table, from_column, to_table, to_column)| ForeignKey {
                from_table,
                from_column,
                to_table,
                to_column,
            })
            .collect();

        debug!(count = fks.len(), "Found foreign keys");
        Ok(fks)
    }
}
