//! Argument model and command dispatch.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flightschool_core::{init_logging, ConfidenceLevel, LogTarget, RowId};
use std::path::PathBuf;

use crate::commands;

#[derive(Parser)]
#[command(name = "flight-school")]
#[command(author, version, about = "Keep an ACS in sync and track confidence per element")]
#[command(propagate_version = true)]
pub struct Cli {
    /// SQLite database file
    #[arg(
        long,
        global = true,
        env = "FLIGHT_SCHOOL_DB",
        default_value = "flight-school.sqlite3"
    )]
    pub db: PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Absolute directory for rolling log files (stderr when unset)
    #[arg(long, global = true, env = "FLIGHT_SCHOOL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the database schema
    Migrate {
        /// Also reconcile every ACS document found in --acs-dir
        #[arg(long)]
        populate_acs: bool,

        /// Directory holding ACS documents (*.json)
        #[arg(long, default_value = "acs")]
        acs_dir: PathBuf,
    },

    /// Reconcile the stored ACS with one JSON document
    PopulateAcs {
        /// Path to the ACS document
        file: PathBuf,
    },

    /// Print a stored task as JSON
    ShowTask {
        /// Task address, e.g. PA.I.A
        address: String,
    },

    /// Record or clear the confidence vote of one element
    SetConfidence {
        /// Element row id
        element_id: RowId,

        level: ConfidenceArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfidenceArg {
    Low,
    Medium,
    High,
    /// Clear any recorded vote
    None,
}

impl ConfidenceArg {
    pub fn level(self) -> Option<ConfidenceLevel> {
        match self {
            Self::Low => Some(ConfidenceLevel::Low),
            Self::Medium => Some(ConfidenceLevel::Medium),
            Self::High => Some(ConfidenceLevel::High),
            Self::None => None,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    start_logging(&cli)?;

    match cli.command {
        Commands::Migrate {
            populate_acs,
            acs_dir,
        } => {
            let conn = commands::open(&cli.db)?;
            println!("Database ready at {}", cli.db.display());
            if populate_acs {
                commands::populate_dir(&conn, &acs_dir)?;
            }
        }
        Commands::PopulateAcs { file } => {
            let conn = commands::open(&cli.db)?;
            commands::populate_file(&conn, &file)?;
        }
        Commands::ShowTask { address } => {
            let conn = commands::open(&cli.db)?;
            commands::show_task(&conn, &address)?;
        }
        Commands::SetConfidence { element_id, level } => {
            let conn = commands::open(&cli.db)?;
            commands::set_confidence(&conn, element_id, level.level())?;
        }
    }

    Ok(())
}

fn start_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug { "debug" } else { "warn" };
    let target = match &cli.log_dir {
        Some(dir) => LogTarget::Directory(dir.clone()),
        None => LogTarget::Stderr,
    };
    init_logging(level, target)
        .map_err(|err| anyhow!(err))
        .context("failed to initialize logging")
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, ConfidenceArg};
    use clap::{CommandFactory, Parser};
    use flightschool_core::ConfidenceLevel;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn set_confidence_accepts_none() {
        let cli = Cli::try_parse_from(["flight-school", "set-confidence", "7", "none"]).unwrap();
        match cli.command {
            Commands::SetConfidence { element_id, level } => {
                assert_eq!(element_id, 7);
                assert_eq!(level, ConfidenceArg::None);
                assert_eq!(level.level(), None);
            }
            _ => panic!("expected set-confidence"),
        }
    }

    #[test]
    fn confidence_arg_maps_to_levels() {
        assert_eq!(ConfidenceArg::High.level(), Some(ConfidenceLevel::High));
        assert!(Cli::try_parse_from(["flight-school", "set-confidence", "7", "maybe"]).is_err());
    }
}
