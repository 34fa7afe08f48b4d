//! # dbtbl
//!
//! Generate table, column, enum and foreign key constants from a live
//! database schema.
//!
//! This crate provides a CLI tool and library for reading MySQL, PostgreSQL
//! and SQLite catalogs and emitting PHP classes of constants, together with
//! an embedded schema hash used to detect drift.

pub mod codegen;
pub mod config;
pub mod error;
pub mod hash;
pub mod introspect;
pub mod naming;
pub mod schema;

pub mod prelude {
    pub use crate::codegen::{
        CheckStatus, CodeGenConfig, CodeGenerator, GenerationReport, OutputMode, PhpRenderer,
        RunOutcome, TblGenerator,
    };
    pub use crate::config::{Config, DbConfig};
    pub use crate::error::{DbTblError, ErrorKind};
    pub use crate::hash::SchemaHasher;
    pub use crate::introspect::{Driver, MemorySchemaReader, SchemaReader};
    pub use crate::naming::{NamingConfig, NamingResolver, NamingStrategy};
    pub use crate::schema::{EnumValue, ForeignKey, SchemaSnapshot, TableDescriptor};
}

#[cfg(feature = "mysql")]
pub use introspect::MySqlSchemaReader;
#[cfg(feature = "postgres")]
pub use introspect::PostgresSchemaReader;
#[cfg(feature = "sqlite")]
pub use introspect::SqliteSchemaReader;
