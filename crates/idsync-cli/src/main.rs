use clap::{Parser, Subcommand};
use idsync_core::IdsyncConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{audit, hr, policy, serve, sync, App};

#[derive(Parser, Debug)]
#[command(name = "idsync", version, about = "Reconcile HR records with target-system access")]
struct Cli {
    /// Configuration file. A missing file means all defaults.
    #[arg(long, short, global = true, env = "IDSYNC_CONFIG", default_value = "idsync.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one reconciliation pass. Dry run unless --apply is given.
    Sync {
        /// Execute the plans against target systems.
        #[arg(long, default_value_t = false)]
        apply: bool,

        /// Actor recorded on the run (defaults to the configured actor).
        #[arg(long)]
        actor: Option<String>,

        /// Print the full run record as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compare one employee's desired and actual access.
    Review {
        employee_id: String,
    },

    /// Inspect past runs.
    Runs {
        #[command(subcommand)]
        cmd: sync::RunsCommand,
    },

    /// Inspect and edit the access policy.
    Policy {
        #[command(subcommand)]
        cmd: policy::PolicyCommand,
    },

    /// Import HR records from a JSON array of employees.
    Import {
        file: PathBuf,

        #[arg(long)]
        actor: Option<String>,

        /// Record the import without running the follow-up sync.
        #[arg(long, default_value_t = false)]
        no_sync: bool,
    },

    /// Update a single employee record.
    Employee {
        #[command(subcommand)]
        cmd: hr::EmployeeCommand,
    },

    /// Run scheduled syncs until interrupted.
    Serve,

    /// Query the audit trail.
    Audit {
        /// Only entries with this action (e.g. `sync_run`, `role_upsert`).
        #[arg(long)]
        action: Option<String>,

        #[arg(long)]
        actor: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = App::new(config)?;

    match cli.cmd {
        Command::Sync { apply, actor, json } => sync::run_sync(&app, apply, actor, json).await?,
        Command::Review { employee_id } => sync::run_review(&app, &employee_id).await?,
        Command::Runs { cmd } => sync::run_runs(&app, cmd).await?,
        Command::Policy { cmd } => policy::run_policy(&app, cmd).await?,
        Command::Import {
            file,
            actor,
            no_sync,
        } => hr::run_import(&app, &file, actor, no_sync).await?,
        Command::Employee { cmd } => hr::run_employee(&app, cmd).await?,
        Command::Serve => serve::run_serve(&app).await?,
        Command::Audit {
            action,
            actor,
            limit,
        } => audit::run_audit(&app, action, actor, limit).await?,
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<IdsyncConfig> {
    use anyhow::Context;

    if path.exists() {
        IdsyncConfig::load_with_context(path)
            .with_context(|| format!("loading configuration from {}", path.display()))
    } else {
        Ok(IdsyncConfig::default())
    }
}
