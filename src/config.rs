//! Configuration loading
//!
//! Reads `dbtbl.toml`, optionally loading a .env file first. String values
//! written as `env(NAME)` or `${NAME}` are replaced from the environment.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer};
use tracing::{debug, error, trace, warn};

use crate::codegen::{CodeGenConfig, OutputMode};
use crate::error::DbTblError;
use crate::introspect::Driver;
use crate::naming::{AbbreviationConfig, NamingConfig};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "dbtbl.toml";

/// Default name of the registry / single-file output
pub const DEFAULT_OUTPUT_FILE: &str = "Tbl.php";

const CONFIG_TEMPLATE: &str = r#"# ------------------------------------------------------------
# dbtbl configuration file
#
# Auto-generated on first run.
# Delete this file to regenerate a clean template.
# ------------------------------------------------------------

[database]
driver = "mysql"            # mysql | pgsql | sqlite

# For MySQL / PostgreSQL
host = "env(DB_HOST)"       # default: localhost
port = "env(DB_PORT)"       # default: 3306 (mysql) / 5432 (pgsql)
name = "env(DB_NAME)"       # required
user = "env(DB_USER)"       # default: root
password = "env(DB_PASS)"   # default: empty
# schema = "public"         # PostgreSQL only

# SQLite only
# path = "env(DB_PATH)"     # e.g. database.sqlite

[output]
# file -> generate all classes into one file
# psr4 -> generate one class per table
mode = "file"

# Base output directory (always a directory)
path = "./"

# REQUIRED for psr4 mode
namespace = ""

# Output file name in file mode
# file = "Tbl.php"

[output.naming]
strategy = "full"           # full | short

[output.naming.abbreviation]
max_length = 15             # segments longer than this are abbreviated
dictionary_lang = "en"      # en | pt | es | all
# dictionary_path = "abbreviations.toml"
"#;

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub driver: String,
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub name: String,
    pub user: String,
    pub password: String,
    /// SQLite database file
    pub path: PathBuf,
    /// PostgreSQL namespace to read
    pub schema: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "localhost".to_string(),
            port: None,
            name: String::new(),
            user: "root".to_string(),
            password: String::new(),
            path: PathBuf::from("database.sqlite"),
            schema: "public".to_string(),
        }
    }
}

impl DbConfig {
    pub fn driver(&self) -> Result<Driver, DbTblError> {
        self.driver.parse()
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            self.driver()
                .map(|d| d.default_port())
                .unwrap_or(Driver::Mysql.default_port())
        })
    }

    /// Name reported for the database; SQLite falls back to the file stem
    pub fn database_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Check the settings the given driver needs are present
    pub fn validate_for(&self, driver: Driver) -> Result<(), DbTblError> {
        match driver {
            Driver::Mysql | Driver::Postgres if self.name.is_empty() => {
                error!(driver = %driver, "database.name is not set");
                Err(DbTblError::Config(
                    "database.name is required (e.g. name = \"env(DB_NAME)\")".to_string(),
                ))
            }
            Driver::Sqlite if self.path.as_os_str().is_empty() => Err(DbTblError::Config(
                "database.path is required for sqlite".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Build a PostgreSQL connection string
    pub fn postgres_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            quote_pg(&self.host),
            self.port_or_default(),
            quote_pg(&self.name),
            quote_pg(&self.user),
            quote_pg(&self.password)
        )
    }

    /// Build a connection description with password redacted (for logs and errors)
    pub fn redacted_connection_string(&self) -> String {
        match self.driver() {
            Ok(Driver::Sqlite) => format!("sqlite:{}", self.path.display()),
            _ => format!(
                "host={} port={} dbname={} user={} password=***",
                self.host,
                self.port_or_default(),
                self.name,
                self.user
            ),
        }
    }

    fn with_fallbacks(mut self) -> Self {
        let defaults = Self::default();
        if self.driver.is_empty() {
            self.driver = defaults.driver;
        }
        if self.host.is_empty() {
            self.host = defaults.host;
        }
        if self.user.is_empty() {
            self.user = defaults.user;
        }
        if self.schema.is_empty() {
            self.schema = defaults.schema;
        }
        if self.path.as_os_str().is_empty() {
            self.path = defaults.path;
        }
        self
    }
}

/// libpq keyword/value quoting
fn quote_pg(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub path: PathBuf,
    pub namespace: Option<String>,
    pub file: String,
    pub naming: NamingConfig,
}

/// Complete, validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, DbTblError> {
        debug!(path = ?path, "Loading configuration");

        let content = fs::read_to_string(path).map_err(|e| {
            error!(path = ?path, error = ?e, "Failed to read configuration");
            DbTblError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        Self::parse(&content).map_err(|e| match e {
            DbTblError::Config(message) => DbTblError::Config(format!(
                "Error loading config file '{}': {}",
                path.display(),
                message
            )),
            other => other,
        })
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self, DbTblError> {
        let mut table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| DbTblError::Config(e.message().to_string()))?;

        for (_, value) in table.iter_mut() {
            substitute_env_vars(value);
        }

        let raw: RawConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| DbTblError::Config(e.message().to_string()))?;

        let config = Self {
            database: raw.database.with_fallbacks(),
            output: raw.output.into_output_config()?,
        };
        config.validate()?;

        trace!(config = ?config, "Configuration parsed");
        Ok(config)
    }

    /// Write the commented starter configuration
    pub fn write_template(path: &Path) -> Result<(), DbTblError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DbTblError::write(parent, e))?;
            }
        }
        fs::write(path, CONFIG_TEMPLATE).map_err(|e| DbTblError::write(path, e))?;
        debug!(path = ?path, "Wrote configuration template");
        Ok(())
    }

    /// Replace the output mode (e.g. from a command line flag) and re-validate
    pub fn with_output_mode(mut self, mode: OutputMode) -> Result<Self, DbTblError> {
        self.output.mode = mode;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), DbTblError> {
        if self.output.mode == OutputMode::Psr4 && self.output.namespace.is_none() {
            return Err(DbTblError::Config(
                "output.namespace is required when output.mode is 'psr4'.".to_string(),
            ));
        }
        if self.output.file.trim().is_empty() {
            return Err(DbTblError::Config("output.file must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output.mode
    }

    pub fn output_path(&self) -> &Path {
        &self.output.path
    }

    pub fn output_namespace(&self) -> Option<&str> {
        self.output.namespace.as_deref()
    }

    /// The registry / single-file output path
    pub fn output_file(&self) -> PathBuf {
        self.output.path.join(&self.output.file)
    }

    pub fn naming_config(&self) -> NamingConfig {
        self.output.naming.clone()
    }

    pub fn codegen_config(&self) -> CodeGenConfig {
        let config = CodeGenConfig::new(self.output.path.clone())
            .with_output_mode(self.output.mode)
            .with_output_file(self.output.file.clone())
            .with_naming(self.naming_config());

        match &self.output.namespace {
            Some(namespace) => config.with_namespace(namespace.clone()),
            None => config,
        }
    }
}

/// Load a .env file into the process environment if it exists
pub fn load_env_file(env_file: &Path) -> Result<(), DbTblError> {
    if env_file.exists() {
        debug!(path = ?env_file, "Loading environment file");
        dotenvy::from_path(env_file).map_err(|e| {
            error!(path = ?env_file, error = ?e, "Failed to load environment file");
            DbTblError::Config(format!("Failed to load {}: {}", env_file.display(), e))
        })?;
    } else {
        warn!(path = ?env_file, "Environment file not found, using existing environment");
    }
    Ok(())
}

/// Resolve `env(NAME)` / `${NAME}`; an unset variable becomes an empty string
pub fn resolve_env_vars(value: &str) -> String {
    let trimmed = value.trim();
    let var = trimmed
        .strip_prefix("env(")
        .and_then(|rest| rest.strip_suffix(')'))
        .or_else(|| {
            trimmed
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
        });

    match var {
        Some(name) => env::var(name.trim()).unwrap_or_else(|_| {
            warn!(variable = ?name, "Environment variable not set, using empty value");
            String::new()
        }),
        None => value.to_string(),
    }
}

fn substitute_env_vars(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => *s = resolve_env_vars(s),
        toml::Value::Array(items) => items.iter_mut().for_each(substitute_env_vars),
        toml::Value::Table(table) => table
            .iter_mut()
            .for_each(|(_, value)| substitute_env_vars(value)),
        _ => {}
    }
}

/// Normalize and check a namespace such as `App\Schema`
pub fn validate_namespace(namespace: &str) -> Result<String, DbTblError> {
    let normalized = namespace.trim().trim_matches('\\');
    let valid = normalized.split('\\').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });

    if valid {
        Ok(normalized.to_string())
    } else {
        Err(DbTblError::Config(format!(
            "output.namespace '{}' is not a valid namespace",
            namespace
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    database: DbConfig,
    output: RawOutput,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawOutput {
    mode: String,
    path: PathBuf,
    namespace: String,
    file: String,
    naming: RawNaming,
}

impl Default for RawOutput {
    fn default() -> Self {
        Self {
            mode: "file".to_string(),
            path: PathBuf::from("./"),
            namespace: String::new(),
            file: DEFAULT_OUTPUT_FILE.to_string(),
            naming: RawNaming::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawNaming {
    strategy: String,
    abbreviation: RawAbbreviation,
}

impl Default for RawNaming {
    fn default() -> Self {
        Self {
            strategy: "full".to_string(),
            abbreviation: RawAbbreviation::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawAbbreviation {
    #[serde(deserialize_with = "deserialize_max_length")]
    max_length: usize,
    dictionary_lang: String,
    dictionary_path: Option<PathBuf>,
}

impl Default for RawAbbreviation {
    fn default() -> Self {
        let defaults = AbbreviationConfig::default();
        Self {
            max_length: defaults.max_length,
            dictionary_lang: defaults.dictionary_lang.to_string(),
            dictionary_path: None,
        }
    }
}

impl RawOutput {
    fn into_output_config(self) -> Result<OutputConfig, DbTblError> {
        let mode = self.mode.parse::<OutputMode>()?;

        let namespace = if self.namespace.trim().is_empty() {
            None
        } else {
            Some(validate_namespace(&self.namespace)?)
        };

        let path = if self.path.as_os_str().is_empty() {
            PathBuf::from("./")
        } else {
            self.path
        };

        let file = if self.file.is_empty() {
            DEFAULT_OUTPUT_FILE.to_string()
        } else {
            self.file
        };

        let abbreviation = AbbreviationConfig {
            max_length: self.naming.abbreviation.max_length,
            dictionary_lang: self.naming.abbreviation.dictionary_lang.parse()?,
            dictionary_path: self
                .naming
                .abbreviation
                .dictionary_path
                .filter(|p| !p.as_os_str().is_empty()),
        };
        if abbreviation.max_length == 0 {
            return Err(DbTblError::Config(
                "output.naming.abbreviation.max_length must be greater than 0".to_string(),
            ));
        }

        let naming =
            NamingConfig::new(self.naming.strategy.parse()?).with_abbreviation(abbreviation);

        Ok(OutputConfig {
            mode,
            path,
            namespace,
            file,
            naming,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{}", n),
            NumberOrString::Text(s) => f.write_str(s),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = NumberOrString::deserialize(deserializer)?;
    let text = raw.to_string();
    if text.trim().is_empty() {
        return Ok(None);
    }
    text.trim()
        .parse::<u16>()
        .map(Some)
        .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", text)))
}

fn deserialize_max_length<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = NumberOrString::deserialize(deserializer)?;
    let text = raw.to_string();
    if text.trim().is_empty() {
        return Ok(AbbreviationConfig::default().max_length);
    }
    text.trim()
        .parse::<usize>()
        .map_err(|_| serde::de::Error::custom(format!("invalid max_length '{}'", text)))
}
