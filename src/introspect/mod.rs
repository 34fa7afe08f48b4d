//! Database introspection
//!
//! This module provides functionality for extracting schema information
//! from databases. Each supported database has its own feature-gated submodule;
//! generation code only ever sees the [`SchemaReader`] trait.

use std::{fmt, str::FromStr};

use tracing::debug;

use crate::config::DbConfig;
use crate::error::DbTblError;
use crate::schema::{EnumValue, ForeignKey, TableDescriptor};

pub mod enums;
pub mod memory;

pub use self::memory::MemorySchemaReader;

/// Read-only access to one database's catalog
///
/// Implementations must return the same answers for the same schema no
/// matter which engine backs them. Failures are never retried.
pub trait SchemaReader {
    /// Name of the introspected database
    fn database_name(&self) -> &str;

    /// Table names in lexical order
    fn list_tables(&mut self) -> Result<Vec<String>, DbTblError>;

    /// Column names in declaration order. Fails with `UnknownTable` for a missing table.
    fn list_columns(&mut self, table: &str) -> Result<Vec<String>, DbTblError>;

    /// Enum literals of the table's enum-like columns, empty if there are none
    fn list_enums(&mut self, table: &str) -> Result<Vec<EnumValue>, DbTblError>;

    /// Every foreign key in the database
    fn list_foreign_keys(&mut self) -> Result<Vec<ForeignKey>, DbTblError>;

    /// Columns and enums of one table
    fn describe_table(&mut self, table: &str) -> Result<TableDescriptor, DbTblError> {
        let columns = self.list_columns(table)?;
        let enums = self.list_enums(table)?;
        Ok(TableDescriptor::new(table, columns).with_enums(enums))
    }
}

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Mysql,
    Postgres,
    Sqlite,
}

impl Driver {
    pub fn default_port(&self) -> u16 {
        match self {
            Driver::Mysql => 3306,
            Driver::Postgres => 5432,
            Driver::Sqlite => 0,
        }
    }
}

impl FromStr for Driver {
    type Err = DbTblError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Driver::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(DbTblError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Mysql => f.write_str("mysql"),
            Driver::Postgres => f.write_str("pgsql"),
            Driver::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Open a reader for the configured driver
pub fn connect(config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    let driver = config.driver()?;
    config.validate_for(driver)?;
    debug!(driver = %driver, "Resolving schema reader");

    match driver {
        Driver::Mysql => connect_mysql(config),
        Driver::Postgres => connect_postgres(config),
        Driver::Sqlite => connect_sqlite(config),
    }
}

#[cfg(feature = "mysql")]
fn connect_mysql(config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Ok(Box::new(MySqlSchemaReader::connect(config)?))
}

#[cfg(not(feature = "mysql"))]
fn connect_mysql(_config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Err(DbTblError::UnsupportedDriver(
        "mysql (support not enabled, rebuild with --features mysql)".to_string(),
    ))
}

#[cfg(feature = "postgres")]
fn connect_postgres(config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Ok(Box::new(PostgresSchemaReader::connect(config)?))
}

#[cfg(not(feature = "postgres"))]
fn connect_postgres(_config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Err(DbTblError::UnsupportedDriver(
        "pgsql (support not enabled, rebuild with --features postgres)".to_string(),
    ))
}

#[cfg(feature = "sqlite")]
fn connect_sqlite(config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Ok(Box::new(SqliteSchemaReader::connect(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn connect_sqlite(_config: &DbConfig) -> Result<Box<dyn SchemaReader>, DbTblError> {
    Err(DbTblError::UnsupportedDriver(
        "sqlite (support not enabled, rebuild with --features sqlite)".to_string(),
    ))
}

// Feature-gated database implementations
#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlSchemaReader;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresSchemaReader;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteSchemaReader;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver() {
        assert_eq!("mysql".parse::<Driver>().unwrap(), Driver::Mysql);
        assert_eq!("pgsql".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!("PostgreSQL".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!("sqlite".parse::<Driver>().unwrap(), Driver::Sqlite);
    }

    #[test]
    fn test_unsupported_driver() {
        let err = "oracle".parse::<Driver>().unwrap_err();
        assert!(matches!(err, DbTblError::UnsupportedDriver(ref d) if d == "oracle"));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Driver::Mysql.default_port(), 3306);
        assert_eq!(Driver::Postgres.default_port(), 5432);
    }
}
