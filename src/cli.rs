//! Command-line argument parsing for sql-runner.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Runs SQL playbooks against Postgres, Redshift and Snowflake targets.
#[derive(Parser, Debug)]
#[command(name = "sql-runner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Playbook file listing targets and steps
    #[arg(short = 'p', long, value_name = "PATH", env = "SQL_RUNNER_PLAYBOOK")]
    pub playbook: PathBuf,

    /// Directory that query files are relative to (defaults to the playbook's directory)
    #[arg(long, value_name = "DIR")]
    pub sql_root: Option<PathBuf>,

    /// Resolve everything but send nothing to the targets
    #[arg(long)]
    pub dry_run: bool,

    /// Start at this step, skipping the ones before it
    #[arg(long, value_name = "STEP")]
    pub from_step: Option<String>,

    /// Only run against this target (repeatable)
    #[arg(short = 't', long = "target", value_name = "NAME")]
    pub targets: Vec<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the directory query files are resolved against.
    pub fn sql_root(&self) -> PathBuf {
        if let Some(root) = &self.sql_root {
            return root.clone();
        }

        match self.playbook.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
