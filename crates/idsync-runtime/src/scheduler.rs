//! Periodic and event-driven sync runs.

use crate::orchestrator::SyncOrchestrator;
use crate::trigger::{SyncCommand, TriggerReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Shortest accepted interval; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Drives the orchestrator from a timer and a queue of [`SyncCommand`]s.
///
/// Runs never overlap: a command arriving mid-run waits for the current
/// run to finish. Before each run the directory and policy are re-read, so
/// imports and policy edits made by other processes are picked up.
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    scheduled_dry_run: bool,
    actor: String,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        interval: Duration,
        scheduled_dry_run: bool,
        actor: impl Into<String>,
    ) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(requested_ms = interval.as_millis() as u64, "Schedule interval too short, using 1s");
        }
        Self {
            orchestrator,
            interval: interval.max(MIN_INTERVAL),
            scheduled_dry_run,
            actor: actor.into(),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Shutdown during a run cancels the employees not yet scheduled and
    /// waits for the run to be recorded before returning.
    pub async fn run(&self, mut commands: mpsc::Receiver<SyncCommand>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            scheduled_dry_run = self.scheduled_dry_run,
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let command = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {
                    SyncCommand::new(self.scheduled_dry_run, self.actor.clone(), TriggerReason::Schedule)
                }
                received = commands.recv(), if commands_open => match received {
                    Some(command) => command,
                    None => {
                        tracing::debug!("Sync request queue closed, continuing on schedule only");
                        commands_open = false;
                        continue;
                    }
                },
            };

            if !self.execute(command, &mut shutdown).await {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Returns `false` if shutdown was requested during the run.
    async fn execute(&self, command: SyncCommand, shutdown: &mut watch::Receiver<bool>) -> bool {
        tracing::info!(
            dry_run = command.dry_run,
            actor = %command.actor,
            reason = %command.reason,
            "Starting triggered sync"
        );

        if let Err(e) = self.orchestrator.refresh_sources(&command.actor).await {
            // Same outcome as an unreadable policy at run start: this run is
            // skipped, the next trigger tries again.
            tracing::error!(error = %e, "Could not refresh employees or policy, skipping sync");
            return true;
        }

        let run = self.orchestrator.run_sync(command.dry_run, &command.actor);
        tokio::pin!(run);

        let mut keep_running = true;
        let result = tokio::select! {
            result = &mut run => result,
            _ = shutdown.changed() => {
                keep_running = false;
                self.orchestrator.cancel();
                run.await
            }
        };

        match result {
            Ok(run) => {
                if let Some(summary) = &run.summary {
                    tracing::info!(
                        run_id = %run.id,
                        processed = summary.processed,
                        failed = summary.failed,
                        cancelled = summary.cancelled,
                        "Triggered sync finished"
                    );
                }
            }
            // Already logged and audited by the orchestrator; the next
            // trigger retries from scratch.
            Err(e) => tracing::warn!(error = %e, "Triggered sync failed"),
        }

        keep_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LocalDirectory;
    use crate::provisioner::{LocalProvisioner, ProvisionerAdapter};
    use crate::runs::{InMemoryRunStore, RunStore};
    use idsync_audit::AuditLogger;
    use idsync_core::{Employee, EmploymentStatus, SyncConfig};
    use idsync_policy::{Grant, Policy, PolicyStore};

    fn orchestrator(dir: &std::path::Path, runs: Arc<InMemoryRunStore>) -> Arc<SyncOrchestrator> {
        let audit = Arc::new(AuditLogger::disabled());
        let store = PolicyStore::open_or_init(dir.join("policy.yaml"), dir, Policy::default(), audit.clone()).unwrap();
        Arc::new(SyncOrchestrator::new(
            Arc::new(store),
            Arc::new(LocalDirectory::with_employees(vec![Employee::new("E1", "a@x.com")])),
            vec![Arc::new(LocalProvisioner::google()) as Arc<dyn ProvisionerAdapter>],
            runs,
            audit,
            SyncConfig::default(),
        ))
    }

    #[tokio::test]
    async fn runs_queued_commands_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(InMemoryRunStore::new());
        let scheduler = Scheduler::new(
            orchestrator(dir.path(), runs.clone()),
            Duration::from_secs(3600),
            true,
            "scheduler",
        );

        let (tx, rx) = mpsc::channel(4);
        let (stop, shutdown) = watch::channel(false);
        tx.send(SyncCommand::new(false, "hr", TriggerReason::OnDemand)).await.unwrap();
        drop(tx);

        let handle = tokio::spawn(async move { scheduler.run(rx, shutdown).await });

        // The immediate first tick plus the queued command.
        for _ in 0..200 {
            if runs.list(None).await.unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.send(true).unwrap();
        handle.await.unwrap();

        let listed = runs.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|run| run.is_complete()));
        assert!(listed.iter().any(|run| !run.dry_run && run.actor == "hr"));
        assert!(listed.iter().any(|run| run.dry_run && run.actor == "scheduler"));
    }

    #[test]
    fn zero_interval_is_raised_to_the_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(
            orchestrator(dir.path(), Arc::new(InMemoryRunStore::new())),
            Duration::ZERO,
            true,
            "s",
        );
        assert_eq!(scheduler.interval, MIN_INTERVAL);
    }

    async fn wait_for_completed_runs(runs: &InMemoryRunStore, count: usize) {
        for _ in 0..500 {
            let listed = runs.list(None).await.unwrap();
            if listed.len() >= count && listed.iter().all(|run| run.is_complete()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} completed runs");
    }

    #[tokio::test]
    async fn runs_see_files_changed_by_other_processes() {
        let dir = tempfile::tempdir().unwrap();
        let employees_path = dir.path().join("employees.json");
        let policy_path = dir.path().join("policy.yaml");

        let directory = Arc::new(LocalDirectory::open(&employees_path).unwrap());
        directory
            .upsert_many(vec![Employee::new("E1", "a@x.com").with_department("Engineering")])
            .unwrap();
        let mut policy = Policy::default();
        policy.roles.insert(
            "Engineering".to_string(),
            Grant::new().with("google", "groups", &["eng@x.com"]),
        );
        let audit = Arc::new(AuditLogger::disabled());
        let store = PolicyStore::open_or_init(&policy_path, dir.path(), policy, audit.clone()).unwrap();

        let google = Arc::new(LocalProvisioner::google());
        let runs = Arc::new(InMemoryRunStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(store),
            directory,
            vec![google.clone() as Arc<dyn ProvisionerAdapter>],
            runs.clone(),
            audit,
            SyncConfig::default(),
        ));
        let scheduler = Scheduler::new(orchestrator, Duration::from_secs(3600), true, "scheduler");

        let (tx, rx) = mpsc::channel(4);
        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx, shutdown).await });

        tx.send(SyncCommand::new(false, "hr", TriggerReason::OnDemand)).await.unwrap();
        // The immediate first tick plus the command.
        wait_for_completed_runs(&runs, 2).await;
        assert!(google.fetch_current("a@x.com").await.unwrap().contains("google", "groups", "eng@x.com"));

        // Another process terminates E1, hires E2 and adds a Sales role.
        LocalDirectory::open(&employees_path)
            .unwrap()
            .upsert_many(vec![
                Employee::new("E1", "a@x.com")
                    .with_department("Engineering")
                    .with_status(EmploymentStatus::Terminated),
                Employee::new("E2", "b@x.com").with_department("Sales"),
            ])
            .unwrap();
        PolicyStore::open(&policy_path, dir.path(), Arc::new(AuditLogger::disabled()))
            .unwrap()
            .upsert_role("cli", "Sales", Grant::new().with("google", "groups", &["sales@x.com"]))
            .await
            .unwrap();

        tx.send(SyncCommand::new(false, "hr", TriggerReason::OnDemand)).await.unwrap();
        wait_for_completed_runs(&runs, 3).await;
        stop.send(true).unwrap();
        handle.await.unwrap();

        assert!(google.fetch_current("a@x.com").await.unwrap().is_empty());
        assert!(google.fetch_current("b@x.com").await.unwrap().contains("google", "groups", "sales@x.com"));
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(InMemoryRunStore::new());
        let scheduler = Scheduler::new(orchestrator(dir.path(), runs), Duration::from_secs(3600), true, "s");

        let (_tx, rx) = mpsc::channel(1);
        let (stop, shutdown) = watch::channel(false);
        drop(stop);

        tokio::time::timeout(Duration::from_secs(5), scheduler.run(rx, shutdown))
            .await
            .unwrap();
    }
}
