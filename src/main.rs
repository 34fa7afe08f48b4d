use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dbtbl::codegen::{CheckStatus, GenerationReport, OutputMode, RunOutcome, TblGenerator};
use dbtbl::config::{self, Config, CONFIG_FILE_NAME};
use dbtbl::error::{DbTblError, ErrorKind};
use dbtbl::introspect;

#[derive(Parser, Debug)]
#[command(name = "dbtbl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file, created from a template if missing
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Path to .env file loaded before the configuration
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Compare the schema hash with the generated output instead of writing
    #[arg(long)]
    check: bool,

    /// Generate PSR-4 classes (one class per table)
    #[arg(long, conflicts_with = "file")]
    psr4: bool,

    /// Generate every class into a single file
    #[arg(long)]
    file: bool,

    /// Overwrite existing PSR-4 files without asking
    #[arg(short, long)]
    yes: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn output_mode(&self) -> Option<OutputMode> {
        match (self.psr4, self.file) {
            (true, _) => Some(OutputMode::Psr4),
            (_, true) => Some(OutputMode::File),
            _ => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("Error: {:#}", e);
        if let Some(tip) = tip(&e, &cli.config) {
            warn!("{}", tip);
        }
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("dbtbl v{}", env!("CARGO_PKG_VERSION"));

    config::load_env_file(&cli.env_file)?;

    if !cli.config.exists() {
        Config::write_template(&cli.config).context("Failed to create configuration file")?;
        info!(path = ?cli.config, "Config created");
        warn!("Edit it and run again.");
        return Ok(());
    }

    let mut config = Config::load(&cli.config)?;
    if let Some(mode) = cli.output_mode() {
        config = config.with_output_mode(mode)?;
    }

    let codegen_config = config.codegen_config();
    debug!(codegen_config = ?codegen_config, "Code generation config");

    info!(connection = %config.database.redacted_connection_string(), "Connecting to database");
    let mut reader = introspect::connect(&config.database)?;
    info!(
        driver = %config.database.driver,
        database = ?reader.database_name(),
        "Database connected"
    );

    let assume_yes = cli.yes;
    let outcome = TblGenerator::new(reader.as_mut(), codegen_config)?
        .with_check_mode(cli.check)
        .with_confirmation(move |files| assume_yes || confirm_overwrite(files))
        .run()?;

    match outcome {
        RunOutcome::Checked(CheckStatus::Unchanged) => info!("Schema unchanged"),
        RunOutcome::Checked(CheckStatus::InitialGenerationRequired) => {
            warn!("Initial generation required")
        }
        RunOutcome::Aborted => info!("Operation aborted by user."),
        RunOutcome::Generated(report) => print_report(&report),
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn print_report(report: &GenerationReport) {
    for file in &report.files {
        info!("Generated: {}", file.display());
    }
    info!(
        tables = report.tables,
        foreign_keys = report.foreign_keys,
        database = ?report.database,
        "Generation summary"
    );

    if let Some(instructions) = &report.instructions {
        println!();
        println!("{}", instructions);
    }
}

/// Ask on the terminal before PSR-4 output lands next to existing files
fn confirm_overwrite(files: &[PathBuf]) -> bool {
    let mut stderr = io::stderr();
    let _ = writeln!(stderr, "The output directory already contains PHP files:");
    for file in files {
        let name = file.file_name().unwrap_or(file.as_os_str());
        let _ = writeln!(stderr, "  - {}", name.to_string_lossy());
    }
    let _ = writeln!(
        stderr,
        "\nGenerating in this directory may overwrite existing classes."
    );
    let _ = write!(stderr, "Continue? [y/N]: ");
    let _ = stderr.flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            warn!(error = ?e, "Failed to read answer");
            false
        }
    }
}

fn find_error(e: &anyhow::Error) -> Option<&DbTblError> {
    e.chain().find_map(|cause| cause.downcast_ref::<DbTblError>())
}

fn exit_code(e: &anyhow::Error) -> i32 {
    find_error(e).map_or(1, DbTblError::exit_code)
}

fn tip(e: &anyhow::Error, config_file: &Path) -> Option<String> {
    let err = find_error(e)?;
    match err.kind() {
        ErrorKind::Config if err.to_string().contains("database.name") => Some(format!(
            "Tip: Set 'database.name' in {}",
            config_file.display()
        )),
        ErrorKind::Schema => match err {
            DbTblError::Connection(_) => Some("Tip: Check your database credentials.".to_string()),
            DbTblError::UnknownDatabase(_) => Some(format!(
                "Tip: Check 'database.name' in {}",
                config_file.display()
            )),
            _ => None,
        },
        ErrorKind::Drift => Some("Run dbtbl without --check to regenerate.".to_string()),
        _ => None,
    }
}
