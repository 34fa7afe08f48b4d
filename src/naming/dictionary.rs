//! Abbreviation dictionaries used by the `short` naming strategy

use std::{collections::BTreeMap, fmt, fs, path::Path, str::FromStr};

use tracing::debug;

use crate::error::DbTblError;

/// Built-in dictionary selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DictionaryLang {
    #[default]
    En,
    Pt,
    Es,
    /// Union of every built-in dictionary
    All,
}

impl FromStr for DictionaryLang {
    type Err = DbTblError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(DictionaryLang::En),
            "pt" => Ok(DictionaryLang::Pt),
            "es" => Ok(DictionaryLang::Es),
            "all" => Ok(DictionaryLang::All),
            other => Err(DbTblError::Config(format!(
                "Invalid output.naming.abbreviation.dictionary_lang '{}'. Allowed values: en, pt, es, all.",
                other
            ))),
        }
    }
}

impl fmt::Display for DictionaryLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DictionaryLang::En => "en",
            DictionaryLang::Pt => "pt",
            DictionaryLang::Es => "es",
            DictionaryLang::All => "all",
        };
        f.write_str(s)
    }
}

const EN: &[(&str, &str)] = &[
    ("account", "acct"),
    ("accounting", "acctg"),
    ("address", "addr"),
    ("administration", "admin"),
    ("administrator", "admin"),
    ("application", "app"),
    ("attachment", "attach"),
    ("attribute", "attr"),
    ("authentication", "authn"),
    ("authorization", "authz"),
    ("category", "cat"),
    ("certificate", "cert"),
    ("configuration", "config"),
    ("customer", "cust"),
    ("department", "dept"),
    ("description", "desc"),
    ("document", "doc"),
    ("employee", "emp"),
    ("environment", "env"),
    ("identifier", "id"),
    ("information", "info"),
    ("inventory", "inv"),
    ("management", "mgmt"),
    ("message", "msg"),
    ("notification", "notif"),
    ("organization", "org"),
    ("parameter", "param"),
    ("permission", "perm"),
    ("preference", "pref"),
    ("product", "prod"),
    ("registration", "reg"),
    ("relationship", "rel"),
    ("reservation", "resv"),
    ("subscription", "subscr"),
    ("transaction", "txn"),
    ("warehouse", "whse"),
];

const PT: &[(&str, &str)] = &[
    ("administracao", "admin"),
    ("atendimento", "atend"),
    ("autorizacao", "autz"),
    ("cadastro", "cad"),
    ("categoria", "cat"),
    ("cliente", "cli"),
    ("configuracao", "config"),
    ("departamento", "depto"),
    ("descricao", "desc"),
    ("documento", "doc"),
    ("endereco", "end"),
    ("fornecedor", "forn"),
    ("funcionario", "func"),
    ("informacao", "info"),
    ("movimentacao", "mov"),
    ("notificacao", "notif"),
    ("organizacao", "org"),
    ("pagamento", "pgto"),
    ("parametro", "param"),
    ("permissao", "perm"),
    ("produto", "prod"),
    ("relacionamento", "rel"),
    ("solicitacao", "solic"),
    ("transacao", "trans"),
    ("usuario", "usr"),
];

const ES: &[(&str, &str)] = &[
    ("administracion", "admin"),
    ("autorizacion", "autz"),
    ("categoria", "cat"),
    ("cliente", "cli"),
    ("configuracion", "config"),
    ("departamento", "depto"),
    ("descripcion", "desc"),
    ("direccion", "dir"),
    ("documento", "doc"),
    ("empleado", "emp"),
    ("informacion", "info"),
    ("notificacion", "notif"),
    ("organizacion", "org"),
    ("parametro", "param"),
    ("permiso", "perm"),
    ("producto", "prod"),
    ("proveedor", "prov"),
    ("relacion", "rel"),
    ("solicitud", "solic"),
    ("transaccion", "trans"),
    ("usuario", "usr"),
];

/// Lowercase word → abbreviation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: BTreeMap<String, String>,
}

impl Dictionary {
    pub fn builtin(lang: DictionaryLang) -> Self {
        let tables: &[&[(&str, &str)]] = match lang {
            DictionaryLang::En => &[EN],
            DictionaryLang::Pt => &[PT],
            DictionaryLang::Es => &[ES],
            DictionaryLang::All => &[EN, PT, ES],
        };

        let mut dictionary = Self::default();
        for table in tables {
            for (word, abbr) in table.iter() {
                // first-listed language wins for shared words
                dictionary
                    .entries
                    .entry(word.to_string())
                    .or_insert_with(|| abbr.to_string());
            }
        }
        dictionary
    }

    /// Load a TOML file of `word = "abbr"` pairs
    pub fn from_file(path: &Path) -> Result<Self, DbTblError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DbTblError::Config(format!(
                "Cannot read abbreviation dictionary {}: {}",
                path.display(),
                e
            ))
        })?;

        let raw: BTreeMap<String, String> = toml::from_str(&content).map_err(|e| {
            DbTblError::Config(format!(
                "Invalid abbreviation dictionary {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = ?path, entries = raw.len(), "Loaded abbreviation dictionary");

        Ok(Self {
            entries: raw
                .into_iter()
                .map(|(word, abbr)| (word.to_lowercase(), abbr))
                .collect(),
        })
    }

    /// Overlay `other` on top of this dictionary
    pub fn merge(mut self, other: Dictionary) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.entries.get(&word.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lang() {
        assert_eq!("en".parse::<DictionaryLang>().unwrap(), DictionaryLang::En);
        assert_eq!(" PT ".parse::<DictionaryLang>().unwrap(), DictionaryLang::Pt);
        assert_eq!("all".parse::<DictionaryLang>().unwrap(), DictionaryLang::All);
        assert!("de".parse::<DictionaryLang>().is_err());
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let dict = Dictionary::builtin(DictionaryLang::En);
        assert_eq!(dict.get("configuration"), Some("config"));
        assert_eq!(dict.get("Configuration"), Some("config"));
        assert_eq!(dict.get("usuario"), None);
    }

    #[test]
    fn test_all_combines_languages() {
        let dict = Dictionary::builtin(DictionaryLang::All);
        assert_eq!(dict.get("customer"), Some("cust"));
        assert_eq!(dict.get("usuario"), Some("usr"));
        assert_eq!(dict.get("proveedor"), Some("prov"));
        assert!(dict.len() > Dictionary::builtin(DictionaryLang::En).len());
    }

    #[test]
    fn test_from_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abbr.toml");
        std::fs::write(&path, "Customer = \"cst\"\nshipment = \"shp\"\n").unwrap();

        let dict = Dictionary::builtin(DictionaryLang::En).merge(Dictionary::from_file(&path).unwrap());

        assert_eq!(dict.get("customer"), Some("cst"));
        assert_eq!(dict.get("shipment"), Some("shp"));
        assert_eq!(dict.get("warehouse"), Some("whse"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Dictionary::from_file(Path::new("/nonexistent/abbr.toml")).unwrap_err();
        assert!(matches!(err, DbTblError::Config(_)));
    }
}
