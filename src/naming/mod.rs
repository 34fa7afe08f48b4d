//! Identifier naming
//!
//! Turns raw table and column names into identifiers that are valid constant
//! and class names in generated code. [`NamingResolver`] is the only place
//! that decides what a generated identifier looks like.

use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};

use tracing::{debug, trace};

use crate::error::DbTblError;

mod dictionary;

pub use dictionary::{Dictionary, DictionaryLang};

/// Prefix of every generated table class and of the registry class
pub const CLASS_PREFIX: &str = "Tbl";

/// Identifiers the generated language refuses as constant names
const RESERVED: &[&str] = &["class"];

/// How table names are turned into identifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Keep every segment as is
    #[default]
    Full,
    /// Abbreviate long segments
    Short,
}

impl FromStr for NamingStrategy {
    type Err = DbTblError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(NamingStrategy::Full),
            "short" => Ok(NamingStrategy::Short),
            other => Err(DbTblError::Config(format!(
                "Invalid output.naming.strategy '{}'. Allowed values: full, short.",
                other
            ))),
        }
    }
}

impl fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingStrategy::Full => f.write_str("full"),
            NamingStrategy::Short => f.write_str("short"),
        }
    }
}

/// Settings for the `short` strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationConfig {
    /// Segments longer than this are abbreviated
    pub max_length: usize,
    pub dictionary_lang: DictionaryLang,
    /// Optional user dictionary layered over the built-in one
    pub dictionary_path: Option<PathBuf>,
}

impl Default for AbbreviationConfig {
    fn default() -> Self {
        Self {
            max_length: 15,
            dictionary_lang: DictionaryLang::En,
            dictionary_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingConfig {
    pub strategy: NamingStrategy,
    pub abbreviation: AbbreviationConfig,
}

impl NamingConfig {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self {
            strategy,
            abbreviation: AbbreviationConfig::default(),
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: AbbreviationConfig) -> Self {
        self.abbreviation = abbreviation;
        self
    }
}

/// Converts raw schema identifiers into code-safe names.
///
/// Output depends only on the configuration and the input string, so the
/// same table always maps to the same identifiers across runs.
#[derive(Debug, Clone)]
pub struct NamingResolver {
    config: NamingConfig,
    dictionary: Dictionary,
}

impl NamingResolver {
    pub fn new(config: NamingConfig) -> Result<Self, DbTblError> {
        if config.abbreviation.max_length == 0 {
            return Err(DbTblError::Config(
                "output.naming.abbreviation.max_length must be greater than 0".to_string(),
            ));
        }

        let mut dictionary = Dictionary::builtin(config.abbreviation.dictionary_lang);
        if let Some(path) = &config.abbreviation.dictionary_path {
            dictionary = dictionary.merge(Dictionary::from_file(path)?);
        }

        debug!(
            strategy = %config.strategy,
            lang = %config.abbreviation.dictionary_lang,
            entries = dictionary.len(),
            "Naming resolver ready"
        );

        Ok(Self { config, dictionary })
    }

    /// Constant name for a table under the given strategy
    pub fn table_const_name(&self, table: &str, strategy: NamingStrategy) -> String {
        let sanitized = sanitize_identifier(table);
        let name = match strategy {
            NamingStrategy::Full => sanitized,
            NamingStrategy::Short => self.abbreviate(&sanitized),
        };
        trace!(table = ?table, strategy = %strategy, name = ?name, "Resolved table constant");
        name
    }

    /// Class name for a table under the configured strategy, e.g. `TblOrderItems`
    pub fn class_name(&self, table: &str) -> String {
        let name = self.table_const_name(table, self.config.strategy);
        format!("{}{}", CLASS_PREFIX, to_pascal_case(&name))
    }

    /// File name holding the class of `table`
    pub fn class_file_name(&self, table: &str) -> String {
        format!("{}.php", self.class_name(table))
    }

    /// Short SQL alias: the first letter of each segment, `order_items` → `oi`
    pub fn table_alias(&self, table: &str) -> String {
        let alias: String = segments(&sanitize_identifier(table))
            .filter_map(|segment| segment.chars().next())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if alias.is_empty() {
            "t".to_string()
        } else {
            alias
        }
    }

    /// Constant name for a column
    pub fn column_const_name(&self, column: &str) -> String {
        sanitize_identifier(column)
    }

    /// Constant name for an enum value given its synthetic key
    pub fn enum_const_name(&self, key: &str) -> String {
        format!("enum_{}", sanitize_identifier(key).trim_start_matches('_'))
    }

    /// Constant name for a foreign key pointing at `referenced_table`.
    ///
    /// Without `pluralize` the last segment is singularized: `users` → `fk_user`.
    pub fn foreign_key_const_name(&self, referenced_table: &str, pluralize: bool) -> String {
        let name = sanitize_identifier(referenced_table);
        let name = if pluralize { name } else { singularize(&name) };
        format!("fk_{}", name.trim_start_matches('_'))
    }

    fn abbreviate(&self, name: &str) -> String {
        let max = self.config.abbreviation.max_length;
        let leading_underscore = name.starts_with('_');

        let abbreviated = segments(name)
            .map(|segment| {
                if segment.len() <= max {
                    return segment.to_string();
                }
                match self.dictionary.get(segment) {
                    Some(abbr) => sanitize_identifier(abbr),
                    None => segment.chars().take(max).collect(),
                }
            })
            .collect::<Vec<_>>()
            .join("_");

        if leading_underscore || starts_with_digit(&abbreviated) {
            format!("_{}", abbreviated.trim_start_matches('_'))
        } else {
            abbreviated
        }
    }
}

/// Tracks names claimed within one scope and rejects duplicates
#[derive(Debug)]
pub struct NameScope {
    scope: String,
    fold_case: bool,
    // key -> (spelling, source)
    claimed: HashMap<String, (String, String)>,
}

impl NameScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            fold_case: false,
            claimed: HashMap::new(),
        }
    }

    /// A scope where names differing only in ASCII case collide, as PHP class names do
    pub fn case_insensitive(scope: impl Into<String>) -> Self {
        Self {
            fold_case: true,
            ..Self::new(scope)
        }
    }

    /// Claim `name` on behalf of `source`. Fails if another source holds it.
    pub fn claim(&mut self, name: &str, source: &str) -> Result<(), DbTblError> {
        let key = if self.fold_case {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        };

        match self.claimed.get(&key) {
            Some((spelling, first)) => Err(DbTblError::NamingCollision {
                scope: self.scope.clone(),
                name: name.to_string(),
                first: if spelling == name {
                    first.clone()
                } else {
                    format!("{} as {}", first, spelling)
                },
                second: source.to_string(),
            }),
            None => {
                self.claimed
                    .insert(key, (name.to_string(), source.to_string()));
                Ok(())
            }
        }
    }
}

/// Make `raw` a valid identifier: `[A-Za-z_][A-Za-z0-9_]*`.
///
/// Runs of other characters become a single `_`, a leading digit gets a `_`
/// prefix and reserved words get a `_` suffix.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_separator && !out.is_empty() && !out.ends_with('_') && c != '_' {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        return "_".to_string();
    }
    if starts_with_digit(&out) {
        out.insert(0, '_');
    }
    if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(&out)) {
        out.push('_');
    }
    out
}

/// Convert snake_case to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    segments(s)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => {
                    let first_upper = first.to_uppercase().to_string();
                    first_upper + chars.as_str()
                }
            }
        })
        .collect()
}

/// Singular form of the last snake_case segment (basic heuristic)
pub fn singularize(name: &str) -> String {
    let (head, last) = match name.rfind('_') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    };

    let singular = if last.ends_with("ies") && last.len() > 3 {
        format!("{}y", &last[..last.len() - 3])
    } else if last.ends_with('s') && !last.ends_with("ss") && last.len() > 1 {
        last[..last.len() - 1].to_string()
    } else {
        last.to_string()
    };

    format!("{}{}", head, singular)
}

fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split('_').filter(|s| !s.is_empty())
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}
