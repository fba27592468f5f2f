//! `idsync serve` - scheduled reconciliation until Ctrl-C.

use super::App;
use anyhow::Result;
use idsync_runtime::{Scheduler, SyncTrigger};
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run_serve(app: &App) -> Result<()> {
    let orchestrator = Arc::new(app.orchestrator()?);
    let scheduler = Scheduler::new(
        orchestrator,
        app.config.sync.schedule_interval(),
        app.config.sync.scheduled_dry_run,
        app.config.actor.clone(),
    );

    // No producers in this mode; holding the sender keeps the queue open.
    let (_trigger, commands) = SyncTrigger::channel(16);
    let (stop, shutdown) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::error!(error = %e, "Could not listen for Ctrl-C"),
        }
        let _ = stop.send(true);
    });

    scheduler.run(commands, shutdown).await;
    Ok(())
}
