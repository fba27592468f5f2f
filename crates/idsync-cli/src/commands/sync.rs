//! `idsync sync`, `idsync review` and `idsync runs`.

use super::App;
use anyhow::{bail, Result};
use clap::Subcommand;
use idsync_core::{EmployeeOutcome, Run};
use idsync_runtime::RunStore;
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum RunsCommand {
    /// List runs, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print one run record as JSON.
    Show { run_id: Uuid },
}

pub async fn run_sync(app: &App, apply: bool, actor: Option<String>, json: bool) -> Result<()> {
    let orchestrator = app.orchestrator()?;
    let actor = app.actor(actor);
    let run = orchestrator.run_sync(!apply, &actor).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }
    Ok(())
}

pub async fn run_review(app: &App, employee_id: &str) -> Result<()> {
    let review = app.orchestrator()?.review(employee_id).await?;
    println!("{}", serde_json::to_string_pretty(&review)?);
    Ok(())
}

pub async fn run_runs(app: &App, cmd: RunsCommand) -> Result<()> {
    match cmd {
        RunsCommand::List { limit } => {
            let runs = app.runs.list(Some(limit)).await?;
            if runs.is_empty() {
                println!("No runs recorded.");
            }
            for run in runs {
                let counts = run
                    .summary
                    .as_ref()
                    .map(|s| format!("{} processed, {} failed, {} planned", s.processed, s.failed, s.actions_planned))
                    .unwrap_or_else(|| "in progress".to_string());
                println!(
                    "{}  {}  {:<7}  {:<12}  {}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    mode(&run),
                    run.actor,
                    counts
                );
            }
        }
        RunsCommand::Show { run_id } => match app.runs.get(run_id).await? {
            Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
            None => bail!("run {run_id} not found"),
        },
    }
    Ok(())
}

fn mode(run: &Run) -> &'static str {
    if run.dry_run { "dry-run" } else { "live" }
}

fn print_run(run: &Run) {
    println!("Run {} ({}) by {}", run.id, mode(run), run.actor);
    let Some(summary) = &run.summary else {
        return;
    };

    for result in &summary.results {
        let marker = match &result.outcome {
            EmployeeOutcome::Succeeded => "ok",
            EmployeeOutcome::Failed { .. } => "FAILED",
            EmployeeOutcome::Cancelled => "cancelled",
        };
        println!("  {} <{}> [{}] {}", result.employee_id, result.identity, result.status, marker);
        if result.access_cleared {
            println!("    access cleared");
        }
        for action in &result.plan {
            println!("    {action}");
        }
        if let EmployeeOutcome::Failed { error } = &result.outcome {
            println!("    error: {error}");
        }
    }

    println!(
        "{} processed, {} succeeded, {} failed, {} cancelled; {} actions planned, {} applied; {} terminated, {} cleared",
        summary.processed,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        summary.actions_planned,
        summary.actions_applied,
        summary.terminated_processed,
        summary.access_cleared,
    );
}
