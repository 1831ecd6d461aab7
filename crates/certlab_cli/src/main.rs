//! `certlab` command-line entry point.
//!
//! # Responsibility
//! - Parse flags and environment into a [`config::CliConfig`].
//! - Initialize core logging before any storage call.
//! - Print one JSON envelope per run; exit non-zero on failure.

mod commands;
mod config;
mod output;

use anyhow::{anyhow, Context, Result};
use certlab_core::{core_version, init_logging, init_stderr_logging, DEFAULT_SIMULATED_FAILURE_INDEX};
use clap::{Parser, Subcommand};
use commands::App;
use config::CliConfig;
use log::info;
use output::Envelope;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "certlab")]
#[command(about = "Create certifications and their rosters atomically")]
#[command(version)]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "CERTLAB_DB_PATH", global = true)]
    db: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, env = "CERTLAB_LOG_LEVEL", global = true)]
    log_level: Option<String>,
    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    #[arg(long, env = "CERTLAB_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the demo certification with its five persons.
    Seed {
        /// Delete all persons and certifications first.
        #[arg(long)]
        clean: bool,
    },
    /// Create a certification from a JSON request (`-` reads stdin).
    Create {
        #[arg(long)]
        input: PathBuf,
    },
    /// Run the create workflow with an injected failure to show rollback.
    SimulateError {
        /// JSON request; defaults to the demo request.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Zero-based roster index to abort at.
        #[arg(long, default_value_t = DEFAULT_SIMULATED_FAILURE_INDEX)]
        fail_at: usize,
    },
    Certifications {
        #[command(subcommand)]
        action: CertificationsAction,
    },
    Persons {
        #[command(subcommand)]
        action: PersonsAction,
    },
}

#[derive(Subcommand)]
enum CertificationsAction {
    List,
    Show { id: Uuid },
    /// Delete a certification and, by cascade, its persons.
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum PersonsAction {
    List {
        /// Only persons of this certification, in roster order.
        #[arg(long)]
        certification: Option<Uuid>,
    },
    Show { id: Uuid },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = CliConfig::resolve(cli.db, cli.log_level, cli.log_dir);
    init_cli_logging(&config)?;
    info!(
        "event=cli_start module=cli status=ok version={} db_path={}",
        core_version(),
        config.db_path.display()
    );

    let app = App::new(config);
    let result = match cli.command {
        Command::Seed { clean } => app.seed(clean),
        Command::Create { input } => app.create(&input),
        Command::SimulateError { input, fail_at } => app.simulate_error(input.as_deref(), fail_at),
        Command::Certifications { action } => match action {
            CertificationsAction::List => app.list_certifications(),
            CertificationsAction::Show { id } => app.show_certification(id),
            CertificationsAction::Delete { id } => app.delete_certification(id),
        },
        Command::Persons { action } => match action {
            PersonsAction::List { certification } => app.list_persons(certification),
            PersonsAction::Show { id } => app.show_person(id),
        },
    };

    let (envelope, exit_code) = match result {
        Ok(envelope) => (envelope, ExitCode::SUCCESS),
        Err(err) => {
            info!(
                "event=cli_command module=cli status=error error_code={} status_code={}",
                err.error_code(),
                err.status()
            );
            (Envelope::failure(&err), ExitCode::FAILURE)
        }
    };

    let rendered =
        serde_json::to_string_pretty(&envelope).context("failed to render command output")?;
    println!("{rendered}");
    Ok(exit_code)
}

fn init_cli_logging(config: &CliConfig) -> Result<()> {
    let initialized = match &config.log_dir {
        Some(dir) => {
            let dir = dir
                .to_str()
                .ok_or_else(|| anyhow!("log dir `{}` is not valid UTF-8", dir.display()))?;
            init_logging(&config.log_level, dir)
        }
        None => init_stderr_logging(&config.log_level),
    };
    initialized.map_err(|err| anyhow!(err).context("failed to initialize logging"))
}
