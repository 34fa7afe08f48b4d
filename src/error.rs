use std::path::PathBuf;

use thiserror::Error;

/// dbtbl errors
#[derive(Error, Debug)]
pub enum DbTblError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database '{0}' does not exist")]
    UnknownDatabase(String),

    #[error("Table '{table}' does not exist in database '{database}'")]
    UnknownTable { database: String, table: String },

    #[error("Failed to introspect database '{database}': {message}")]
    Introspection { database: String, message: String },

    #[error("Unsupported database driver '{0}'")]
    UnsupportedDriver(String),

    #[error("No tables found in database '{0}'")]
    NoTables(String),

    #[error("Schema changed (saved md5:{saved}, current md5:{current})")]
    Drift { saved: String, current: String },

    #[error("Naming collision in {scope}: '{name}' is produced by both '{first}' and '{second}'")]
    NamingCollision {
        scope: String,
        name: String,
        first: String,
        second: String,
    },

    #[error("Code generation failed for table '{table}': {message}")]
    CodeGen { table: String, message: String },

    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse error categories, one per failure class a caller reacts to differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Schema,
    NoTables,
    Drift,
    Naming,
    Render,
    Write,
}

impl DbTblError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbTblError::Config(_) => ErrorKind::Config,
            DbTblError::Connection(_)
            | DbTblError::UnknownDatabase(_)
            | DbTblError::UnknownTable { .. }
            | DbTblError::Introspection { .. }
            | DbTblError::UnsupportedDriver(_) => ErrorKind::Schema,
            DbTblError::NoTables(_) => ErrorKind::NoTables,
            DbTblError::Drift { .. } => ErrorKind::Drift,
            DbTblError::NamingCollision { .. } => ErrorKind::Naming,
            DbTblError::CodeGen { .. } => ErrorKind::Render,
            DbTblError::Read { .. } | DbTblError::Write { .. } => ErrorKind::Write,
        }
    }

    /// Process exit code for this failure. Drift gets its own code so CI can tell it apart.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Drift => 2,
            _ => 1,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DbTblError::Write {
            path: path.into(),
            source,
        }
    }
}
