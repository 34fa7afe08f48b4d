//! Code generation
//!
//! This module drives a generation run: it reads the schema through a
//! [`SchemaReader`], hashes it, and either compares the hash against the
//! previous output (check mode) or renders and writes the PHP artifacts.

use std::{
    fmt, fs,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::DbTblError;
use crate::hash::{read_schema_hash, SchemaHasher};
use crate::introspect::SchemaReader;
use crate::naming::NamingConfig;
use crate::schema::{ForeignKey, SchemaSnapshot, TableDescriptor};

pub mod php;

pub use php::{PhpRenderer, TableClass};

/// Format of the `@generated` header line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output mode for generated code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Registry and every table class in a single file
    #[default]
    File,
    /// One class file per table plus a registry file
    Psr4,
}

impl FromStr for OutputMode {
    type Err = DbTblError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(OutputMode::File),
            "psr4" | "psr-4" => Ok(OutputMode::Psr4),
            other => Err(DbTblError::Config(format!(
                "Invalid output.mode '{}'. Expected 'file' or 'psr4'.",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::File => f.write_str("file"),
            OutputMode::Psr4 => f.write_str("psr4"),
        }
    }
}

/// Configuration for code generation
#[derive(Debug, Clone)]
pub struct CodeGenConfig {
    /// Output directory
    pub output_path: PathBuf,
    /// Output mode
    pub output_mode: OutputMode,
    /// Namespace declared by every generated file; required in PSR4 mode
    pub namespace: Option<String>,
    /// File name used in File mode
    pub output_file: String,
    pub naming: NamingConfig,
}

impl CodeGenConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            output_mode: OutputMode::default(),
            namespace: None,
            output_file: crate::config::DEFAULT_OUTPUT_FILE.to_string(),
            naming: NamingConfig::default(),
        }
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_output_file(mut self, file: impl Into<String>) -> Self {
        self.output_file = file.into();
        self
    }

    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    /// The artifact carrying the schema hash
    pub fn registry_path(&self) -> PathBuf {
        match self.output_mode {
            OutputMode::File => self.output_path.join(&self.output_file),
            OutputMode::Psr4 => self.output_path.join(php::REGISTRY_FILE),
        }
    }

    /// Fail unless the configuration is complete for its mode
    pub fn validate(&self) -> Result<(), DbTblError> {
        if self.output_mode == OutputMode::Psr4 && self.namespace.is_none() {
            return Err(DbTblError::Config(
                "PSR-4 output requires \"output.namespace\" to be set.".to_string(),
            ));
        }
        Ok(())
    }
}

/// One file to be written, relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

/// Everything a renderer needs for one run
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub database: &'a str,
    /// Sorted by table name
    pub tables: &'a [TableDescriptor],
    /// Sorted in natural tuple order
    pub foreign_keys: &'a [ForeignKey],
    pub schema_hash: &'a str,
    pub generated_at: &'a str,
}

/// Trait for target-language renderers
///
/// Rendering is pure: the same input always yields the same artifacts, and
/// nothing is written to disk.
pub trait CodeGenerator {
    /// Artifacts in write order. The one carrying the schema hash comes last.
    fn render(&self, input: &RenderInput<'_>) -> Result<Vec<Artifact>, DbTblError>;
}

/// Progress of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    TablesFetched,
    HashComputed,
    CheckReported,
    ContentRendered,
    Written,
    InstructionsPrinted,
}

/// Result of a check-mode run that did not detect drift
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Unchanged,
    InitialGenerationRequired,
}

/// Summary of a completed generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub files: Vec<PathBuf>,
    pub tables: usize,
    pub foreign_keys: usize,
    pub database: String,
    pub schema_hash: String,
    /// Post-generation guidance, File mode only
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Checked(CheckStatus),
    Generated(GenerationReport),
    /// The overwrite confirmation was declined; nothing was written
    Aborted,
}

type ConfirmFn<'a> = Box<dyn FnMut(&[PathBuf]) -> bool + 'a>;

/// Runs one generation (or check) against a schema reader
pub struct TblGenerator<'a> {
    reader: &'a mut dyn SchemaReader,
    config: CodeGenConfig,
    renderer: Box<dyn CodeGenerator + 'a>,
    check_mode: bool,
    confirm_overwrite: Option<ConfirmFn<'a>>,
    stage: Stage,
}

impl<'a> TblGenerator<'a> {
    /// Generator rendering PHP with [`PhpRenderer`]
    pub fn new(reader: &'a mut dyn SchemaReader, config: CodeGenConfig) -> Result<Self, DbTblError> {
        config.validate()?;
        let renderer = PhpRenderer::new(&config)?;
        Ok(Self::with_renderer(reader, config, Box::new(renderer)))
    }

    pub fn with_renderer(
        reader: &'a mut dyn SchemaReader,
        config: CodeGenConfig,
        renderer: Box<dyn CodeGenerator + 'a>,
    ) -> Self {
        Self {
            reader,
            config,
            renderer,
            check_mode: false,
            confirm_overwrite: None,
            stage: Stage::Start,
        }
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// Asked with the existing `*.php` files before PSR4 output overwrites them
    pub fn with_confirmation(mut self, confirm: impl FnMut(&[PathBuf]) -> bool + 'a) -> Self {
        self.confirm_overwrite = Some(Box::new(confirm));
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn run(&mut self) -> Result<RunOutcome, DbTblError> {
        self.config.validate()?;
        self.stage = Stage::Start;
        let database = self.reader.database_name().to_string();

        info!(
            database = ?database,
            mode = %self.config.output_mode,
            check = self.check_mode,
            "Starting generation"
        );

        let mut table_names = self.reader.list_tables()?;
        if table_names.is_empty() {
            return Err(DbTblError::NoTables(database));
        }
        table_names.sort();
        table_names.dedup();
        self.advance(Stage::TablesFetched);

        let mut tables = Vec::with_capacity(table_names.len());
        for name in &table_names {
            let table = self.reader.describe_table(name)?;
            debug!(
                table = ?table.name,
                columns = table.columns.len(),
                enums = table.enums.len(),
                "Table"
            );
            tables.push(table);
        }

        let mut foreign_keys = self.reader.list_foreign_keys()?;
        foreign_keys.sort();
        foreign_keys.dedup();

        let snapshot = SchemaSnapshot::new(&database, &tables, &foreign_keys);
        let schema_hash = SchemaHasher::hash(&snapshot);
        self.advance(Stage::HashComputed);
        info!(
            tables = tables.len(),
            foreign_keys = foreign_keys.len(),
            hash = ?schema_hash,
            "Schema read"
        );

        if self.check_mode {
            let status = self.check(&schema_hash)?;
            self.advance(Stage::CheckReported);
            return Ok(RunOutcome::Checked(status));
        }

        let generated_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let artifacts = self.renderer.render(&RenderInput {
            database: &database,
            tables: &tables,
            foreign_keys: &foreign_keys,
            schema_hash: &schema_hash,
            generated_at: &generated_at,
        })?;
        self.advance(Stage::ContentRendered);

        if self.config.output_mode == OutputMode::Psr4 && !self.confirm()? {
            info!("Operation aborted by user");
            return Ok(RunOutcome::Aborted);
        }

        let files = self.write(&artifacts)?;
        self.advance(Stage::Written);

        let instructions = match self.config.output_mode {
            OutputMode::File => Some(composer_instructions(&self.config.registry_path())),
            OutputMode::Psr4 => None,
        };
        self.advance(Stage::InstructionsPrinted);

        info!(files = files.len(), "Generation complete");

        Ok(RunOutcome::Generated(GenerationReport {
            files,
            tables: tables.len(),
            foreign_keys: foreign_keys.len(),
            database,
            schema_hash,
            instructions,
        }))
    }

    fn advance(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "Stage");
        self.stage = stage;
    }

    fn check(&self, current: &str) -> Result<CheckStatus, DbTblError> {
        let path = self.config.registry_path();
        info!(path = ?path, "Checking schema changes");

        match read_schema_hash(&path)? {
            None => {
                warn!(path = ?path, "No schema hash found, initial generation required");
                Ok(CheckStatus::InitialGenerationRequired)
            }
            Some(saved) if saved == current => {
                info!("Schema unchanged");
                Ok(CheckStatus::Unchanged)
            }
            Some(saved) => Err(DbTblError::Drift {
                saved,
                current: current.to_string(),
            }),
        }
    }

    fn confirm(&mut self) -> Result<bool, DbTblError> {
        let existing = existing_artifacts(&self.config.output_path)?;
        if existing.is_empty() {
            return Ok(true);
        }

        warn!(
            path = ?self.config.output_path,
            files = existing.len(),
            "Output directory already contains PHP files"
        );

        match self.confirm_overwrite.as_mut() {
            Some(confirm) => Ok(confirm(&existing)),
            None => Ok(true),
        }
    }

    fn write(&self, artifacts: &[Artifact]) -> Result<Vec<PathBuf>, DbTblError> {
        let dir = &self.config.output_path;
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|e| DbTblError::write(dir, e))?;
            debug!(path = ?dir, "Created output directory");
        }

        let mut files = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let path = dir.join(&artifact.file_name);
            fs::write(&path, &artifact.contents).map_err(|e| DbTblError::write(&path, e))?;
            debug!(path = ?path, bytes = artifact.contents.len(), "Wrote file");
            files.push(path);
        }
        Ok(files)
    }
}

/// Every `*.php` file directly inside `dir`, sorted by name
pub fn existing_artifacts(dir: &Path) -> Result<Vec<PathBuf>, DbTblError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| DbTblError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| DbTblError::Read {
                path: dir.to_path_buf(),
                source: e,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "php") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// How to register a single generated file with composer
pub fn composer_instructions(file: &Path) -> String {
    let relative = relative_display(file);
    format!(
        "To use generated classes globally, add to composer.json:\n\
         \x20 \"autoload\": {{\n\
         \x20   \"files\": [\n\
         \x20     \"{}\"\n\
         \x20   ]\n\
         \x20 }}\n\
         \n\
         Then run: composer dump-autoload",
        relative
    )
}

fn relative_display(file: &Path) -> String {
    let file = match std::env::current_dir() {
        Ok(cwd) => file.strip_prefix(&cwd).unwrap_or(file),
        Err(_) => file,
    };
    let cleaned: PathBuf = file
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    cleaned.to_string_lossy().replace('\\', "/")
}
