//! `txscope` command line entry point.
//!
//! # Responsibility
//! - Build SQLite databases from SQL feature scripts.
//! - Expose the script splitter for inspecting what will be executed.

use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use txscope_core::schema::{split_sql, DatabaseBuilder};
use txscope_core::{init_logging_with, Database, Session, Settings};

#[derive(Parser)]
#[command(name = "txscope", about = "SQL feature scripts and SQLite databases", version)]
struct Cli {
    /// JSON settings file (`db` and `log` sections).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply features (and their requirements) to a database in one transaction.
    Build {
        /// Directory holding `<feature>.sql` scripts.
        #[arg(long)]
        sql_dir: PathBuf,
        /// Database file, created when missing.
        #[arg(long)]
        db: PathBuf,
        /// Write rolling logs to this absolute directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(required = true)]
        features: Vec<String>,
    },
    /// Print the statements of a SQL script, separated by blank lines.
    Split { file: PathBuf },
    /// Print the core library version.
    Version,
}

fn main() -> Result<(), Box<dyn Error>> {
    let output = run(Cli::parse())?;
    println!("{output}");
    Ok(())
}

/// Executes a parsed command and returns what it prints.
fn run(cli: Cli) -> Result<String, Box<dyn Error>> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Build {
            sql_dir,
            db,
            log_dir,
            features,
        } => {
            let applied = build(settings, &sql_dir, &db, log_dir, &features)?;
            let lines: Vec<String> = applied
                .iter()
                .map(|feature| format!("applied {feature}"))
                .collect();
            Ok(lines.join("\n"))
        }
        Commands::Split { file } => {
            let script = std::fs::read_to_string(&file)?;
            Ok(split_sql(&script).join("\n\n"))
        }
        Commands::Version => Ok(format!("txscope {}", txscope_core::core_version())),
    }
}

/// Applies `features` in one transaction and returns them in application order.
fn build(
    mut settings: Settings,
    sql_dir: &Path,
    db: &Path,
    log_dir: Option<PathBuf>,
    features: &[String],
) -> Result<Vec<String>, Box<dyn Error>> {
    if log_dir.is_some() {
        settings.log.dir = log_dir;
    }
    init_logging_with(&settings.log)?;

    let mut session = Session::new(Database::file(db, settings.db));
    session.enter()?;

    let mut tx = session.begin_transaction()?;
    let mut builder = DatabaseBuilder::new(&tx, sql_dir);
    let result = builder.require(features);
    let applied = builder.applied().to_vec();
    drop(builder);

    if let Err(err) = result {
        tx.rollback()?;
        return Err(err.into());
    }
    tx.commit()?;
    drop(tx);
    session.exit()?;

    info!(
        "event=cli_build module=cli status=ok db={} applied={}",
        db.display(),
        applied.join(",")
    );
    Ok(applied)
}
