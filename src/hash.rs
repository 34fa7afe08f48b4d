//! Schema fingerprinting
//!
//! The fingerprint is embedded in generated artifacts as `schema-hash md5:<hex>`
//! and read back in check mode to detect drift.

use std::{fs, io, path::Path};

use md5::{Digest, Md5};
use tracing::{debug, trace};

use crate::error::DbTblError;
use crate::schema::SchemaSnapshot;

/// Marker preceding the hex digest inside generated files
pub const HASH_MARKER: &str = "schema-hash md5:";

const DOMAIN_TAG: &[u8] = b"dbtbl-schema:v1";

/// Deterministic md5 fingerprint of a [`SchemaSnapshot`]
pub struct SchemaHasher;

impl SchemaHasher {
    /// Hash a snapshot into a 32 character lowercase hex digest.
    ///
    /// Every string is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// never produce the same byte stream.
    pub fn hash(snapshot: &SchemaSnapshot) -> String {
        let mut hasher = Md5::new();
        hasher.update(DOMAIN_TAG);

        write_str(&mut hasher, &snapshot.database);

        write_len(&mut hasher, snapshot.tables.len());
        for (table, columns) in &snapshot.tables {
            write_str(&mut hasher, table);
            write_len(&mut hasher, columns.len());
            for column in columns {
                write_str(&mut hasher, column);
            }
        }

        write_len(&mut hasher, snapshot.foreign_keys.len());
        for fk in &snapshot.foreign_keys {
            write_str(&mut hasher, &fk.from_table);
            write_str(&mut hasher, &fk.from_column);
            write_str(&mut hasher, &fk.to_table);
            write_str(&mut hasher, &fk.to_column);
        }

        let digest = format!("{:x}", hasher.finalize());
        trace!(database = ?snapshot.database, hash = ?digest, "Computed schema hash");
        digest
    }
}

fn write_len(hasher: &mut Md5, len: usize) {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    hasher.update(len.to_be_bytes());
}

fn write_str(hasher: &mut Md5, value: &str) {
    write_len(hasher, value.len());
    hasher.update(value.as_bytes());
}

/// Extract the embedded hash from generated file contents
pub fn extract_schema_hash(contents: &str) -> Option<String> {
    let start = contents.find(HASH_MARKER)? + HASH_MARKER.len();
    let digest: String = contents[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();

    if digest.is_empty() {
        None
    } else {
        Some(digest.to_ascii_lowercase())
    }
}

/// Read the embedded hash of a previously generated file.
///
/// Returns `Ok(None)` when the file does not exist or carries no marker.
pub fn read_schema_hash(path: &Path) -> Result<Option<String>, DbTblError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let hash = extract_schema_hash(&contents);
            debug!(path = ?path, hash = ?hash, "Read embedded schema hash");
            Ok(hash)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = ?path, "No previously generated file");
            Ok(None)
        }
        Err(e) => Err(DbTblError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, TableDescriptor};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn shop_tables() -> Vec<TableDescriptor> {
        vec![
            TableDescriptor::new("orders", cols(&["id", "user_id", "total"])),
            TableDescriptor::new("users", cols(&["id", "email"])),
        ]
    }

    fn shop_fks() -> Vec<ForeignKey> {
        vec![ForeignKey::new("orders", "user_id", "users", "id")]
    }

    fn hash_of(tables: &[TableDescriptor], fks: &[ForeignKey]) -> String {
        SchemaHasher::hash(&SchemaSnapshot::new("shop", tables, fks))
    }

    #[test]
    fn test_hash_is_md5_hex() {
        let hash = hash_of(&shop_tables(), &shop_fks());
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(
            hash_of(&shop_tables(), &shop_fks()),
            hash_of(&shop_tables(), &shop_fks())
        );
    }

    #[test]
    fn test_hash_ignores_driver_order() {
        let mut tables = shop_tables();
        tables.reverse();
        let mut fks = shop_fks();
        fks.push(ForeignKey::new("audit", "user_id", "users", "id"));
        let mut reversed_fks = fks.clone();
        reversed_fks.reverse();

        assert_eq!(hash_of(&shop_tables(), &fks), hash_of(&tables, &reversed_fks));
    }

    #[test]
    fn test_hash_changes_on_column_change() {
        let base = hash_of(&shop_tables(), &shop_fks());

        let mut added = shop_tables();
        added[1].columns.push("name".to_string());
        assert_ne!(base, hash_of(&added, &shop_fks()));

        let mut renamed = shop_tables();
        renamed[1].columns[1] = "mail".to_string();
        assert_ne!(base, hash_of(&renamed, &shop_fks()));

        let mut removed = shop_tables();
        removed[0].columns.pop();
        assert_ne!(base, hash_of(&removed, &shop_fks()));
    }

    #[test]
    fn test_hash_changes_on_table_and_fk_change() {
        let base = hash_of(&shop_tables(), &shop_fks());

        let mut tables = shop_tables();
        tables.push(TableDescriptor::new("products", cols(&["id"])));
        assert_ne!(base, hash_of(&tables, &shop_fks()));

        assert_ne!(base, hash_of(&shop_tables(), &[]));

        let redirected = vec![ForeignKey::new("orders", "user_id", "users", "uuid")];
        assert_ne!(base, hash_of(&shop_tables(), &redirected));
    }

    #[test]
    fn test_hash_framing_separates_strings() {
        let a = vec![TableDescriptor::new("t", cols(&["ab", "c"]))];
        let b = vec![TableDescriptor::new("t", cols(&["a", "bc"]))];
        assert_ne!(hash_of(&a, &[]), hash_of(&b, &[]));
    }

    #[test]
    fn test_extract_schema_hash() {
        let contents = "<?php\n/**\n * @schema-hash md5:0123456789abcdef0123456789abcdef\n * @generated   2024-01-01 00:00:00\n */\n";
        assert_eq!(
            extract_schema_hash(contents),
            Some("0123456789abcdef0123456789abcdef".to_string())
        );
        assert_eq!(extract_schema_hash("<?php\nfinal class Tbl {}\n"), None);
        assert_eq!(extract_schema_hash("@schema-hash md5:\n"), None);
    }

    #[test]
    fn test_read_schema_hash_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_schema_hash(&dir.path().join("Tbl.php")).unwrap();
        assert_eq!(result, None);
    }
}
