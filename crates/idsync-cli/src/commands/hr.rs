//! `idsync import` and `idsync employee`.
//!
//! Both queue a follow-up sync. Outside `serve` nothing else drains that
//! queue, so the command runs the queued syncs itself before exiting unless
//! told not to.

use super::App;
use anyhow::Result;
use clap::Subcommand;
use idsync_core::EmploymentStatus;
use idsync_runtime::{EmployeeUpdate, SyncCommand, SyncTrigger};
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Subcommand, Debug)]
pub enum EmployeeCommand {
    /// Change fields on one employee. Terminating triggers a live sync.
    Update {
        employee_id: String,

        /// `Active`, `Terminated` or `Inactive` (case-insensitive).
        #[arg(long)]
        status: Option<EmploymentStatus>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        employment_type: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        actor: Option<String>,

        /// Record the change without running the follow-up sync.
        #[arg(long, default_value_t = false)]
        no_sync: bool,
    },
}

pub async fn run_import(app: &App, file: &Path, actor: Option<String>, no_sync: bool) -> Result<()> {
    let (trigger, commands) = SyncTrigger::channel(4);
    let report = app.ingest(trigger).import_file(&app.actor(actor), file).await?;

    println!(
        "Imported {} records: {} created, {} updated, {} newly terminated.",
        report.records,
        report.created,
        report.updated,
        report.newly_terminated.len()
    );

    if !no_sync {
        drain(app, commands).await?;
    }
    Ok(())
}

pub async fn run_employee(app: &App, cmd: EmployeeCommand) -> Result<()> {
    match cmd {
        EmployeeCommand::Update {
            employee_id,
            status,
            department,
            title,
            location,
            employment_type,
            email,
            actor,
            no_sync,
        } => {
            let update = EmployeeUpdate {
                email,
                department,
                title,
                location,
                employment_type,
                status,
                ..Default::default()
            };
            let (trigger, commands) = SyncTrigger::channel(4);
            let change = app
                .ingest(trigger)
                .update_employee(&app.actor(actor), &employee_id, &update)
                .await?;

            println!(
                "Updated {} ({} -> {}).",
                change.employee.id, change.previous, change.employee.status
            );

            if !no_sync {
                drain(app, commands).await?;
            }
        }
    }
    Ok(())
}

/// Run every sync the command queued.
async fn drain(app: &App, mut commands: mpsc::Receiver<SyncCommand>) -> Result<()> {
    let mut pending = Vec::new();
    while let Ok(command) = commands.try_recv() {
        pending.push(command);
    }
    if pending.is_empty() {
        return Ok(());
    }

    let orchestrator = app.orchestrator()?;
    for command in pending {
        let run = orchestrator.run_sync(command.dry_run, &command.actor).await?;
        let summary = run.summary.unwrap_or_default();
        println!(
            "Sync ({}, {}): run {}, {} processed, {} failed, {} actions planned, {} cleared.",
            command.reason,
            if command.dry_run { "dry-run" } else { "live" },
            run.id,
            summary.processed,
            summary.failed,
            summary.actions_planned,
            summary.access_cleared,
        );
    }
    Ok(())
}
