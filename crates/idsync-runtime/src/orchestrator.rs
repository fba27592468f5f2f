//! Reconciliation runs across all employees and target systems.
//!
//! A run takes one policy snapshot and one directory snapshot, then works
//! through employees on a bounded pool. Each employee is resolved, fetched,
//! planned and (unless the run is a dry run) applied independently: a
//! failing system or a slow adapter is recorded in that employee's result
//! and the run carries on.

use crate::directory::EmployeeDirectory;
use crate::error::{DirectoryError, ProvisionerError, SyncError};
use crate::provisioner::ProvisionerAdapter;
use crate::review::AccessReview;
use crate::runs::RunStore;
use idsync_audit::{actions, AuditLogger};
use idsync_core::{
    Action, Employee, EmployeeOutcome, EmployeeResult, EntitlementSet, Run, RunSummary, SyncConfig,
};
use idsync_planner::plan;
use idsync_policy::{preview_impact, EntitlementResolver, ImpactReport, Policy, PolicyStore, PolicyUpdate};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

type Adapters = Arc<[Arc<dyn ProvisionerAdapter>]>;

/// Runs reconciliation passes.
pub struct SyncOrchestrator {
    policy: Arc<PolicyStore>,
    directory: Arc<dyn EmployeeDirectory>,
    adapters: Adapters,
    runs: Arc<dyn RunStore>,
    audit: Arc<AuditLogger>,
    config: SyncConfig,
    locks: Arc<IdentityLocks>,
    cancelled: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    pub fn new(
        policy: Arc<PolicyStore>,
        directory: Arc<dyn EmployeeDirectory>,
        adapters: Vec<Arc<dyn ProvisionerAdapter>>,
        runs: Arc<dyn RunStore>,
        audit: Arc<AuditLogger>,
        config: SyncConfig,
    ) -> Self {
        Self {
            policy,
            directory,
            adapters: adapters.into(),
            runs,
            audit,
            config,
            locks: Arc::new(IdentityLocks::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn adapters(&self) -> &[Arc<dyn ProvisionerAdapter>] {
        &self.adapters
    }

    /// Stop scheduling employees. Work already in flight finishes; everyone
    /// else is recorded as cancelled. Stays in effect until [`Self::resume`].
    pub fn cancel(&self) {
        tracing::info!("Sync cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Re-read the employee directory and the policy document so edits
    /// saved by other processes reach the next run.
    pub async fn refresh_sources(&self, actor: &str) -> Result<(), SyncError> {
        self.directory.refresh().await?;
        if self.policy.refresh(actor).await? {
            tracing::info!("Policy document changed on disk, reloaded");
        }
        Ok(())
    }

    /// Reconcile every employee in the directory.
    ///
    /// Returns the completed run. Per-employee failures are in the run's
    /// summary; an `Err` means the run itself could not be carried out.
    pub async fn run_sync(&self, dry_run: bool, actor: &str) -> Result<Run, SyncError> {
        match self.execute(dry_run, actor).await {
            Ok(run) => Ok(run),
            Err(err) => {
                tracing::error!(dry_run, actor, error = %err, "Sync run failed");
                let recorded = self
                    .audit
                    .record(
                        actor,
                        actions::SYNC_RUN,
                        "run",
                        "-",
                        json!({ "dry_run": dry_run, "error": err.to_string() }),
                        false,
                    )
                    .await;
                if let Err(e) = recorded {
                    tracing::error!(error = %e, "Could not audit failed sync run");
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, dry_run: bool, actor: &str) -> Result<Run, SyncError> {
        let policy = self.policy.snapshot()?;
        let employees = self.directory.list().await?;

        let mut run = Run::start(actor, dry_run);
        self.runs.create(&run).await?;

        let span = tracing::info_span!("sync_run", run_id = %run.id, dry_run, actor);
        async {
            tracing::info!(employees = employees.len(), "Sync run started");

            let results = self.reconcile_all(policy, &employees, dry_run).await;
            let summary = RunSummary::from_results(results);
            let details = json!({
                "dry_run": dry_run,
                "processed": summary.processed,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "cancelled": summary.cancelled,
                "access_cleared": summary.access_cleared,
                "terminated_processed": summary.terminated_processed,
                "actions_planned": summary.actions_planned,
                "actions_applied": summary.actions_applied,
            });
            let success = summary.failed == 0;

            run.complete(summary);
            self.runs.complete(&run).await?;

            tracing::info!(%details, "Sync run completed");

            // The run record is already persisted; an audit outage must not
            // hide it from the caller.
            if let Err(e) = self
                .audit
                .record(actor, actions::SYNC_RUN, "run", &run.id.to_string(), details, success)
                .await
            {
                tracing::error!(error = %e, "Could not audit sync run");
            }

            Ok::<_, SyncError>(run)
        }
        .instrument(span)
        .await
    }

    async fn reconcile_all(
        &self,
        policy: Arc<Policy>,
        employees: &[Employee],
        dry_run: bool,
    ) -> Vec<EmployeeResult> {
        let worker = Worker {
            policy,
            adapters: self.adapters.clone(),
            locks: self.locks.clone(),
            resolver: EntitlementResolver::new(),
            timeout: self.config.provisioner_timeout(),
            dry_run,
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut scheduled = 0;

        for (index, employee) in employees.iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if self.is_cancelled() {
                tracing::info!(remaining = employees.len() - index, "Run cancelled, not scheduling remaining employees");
                break;
            }

            let worker = worker.clone();
            let employee = employee.clone();
            let span = tracing::info_span!("employee", id = %employee.id);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    (index, worker.reconcile(employee).await)
                }
                .instrument(span),
            );
            scheduled += 1;
        }

        let mut slots: Vec<Option<EmployeeResult>> = employees.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Employee task aborted"),
            }
        }

        slots
            .into_iter()
            .zip(employees)
            .enumerate()
            .map(|(index, (slot, employee))| {
                slot.unwrap_or_else(|| {
                    let outcome = if index < scheduled {
                        EmployeeOutcome::Failed {
                            error: "worker task aborted".to_string(),
                        }
                    } else {
                        EmployeeOutcome::Cancelled
                    };
                    unprocessed(employee, outcome)
                })
            })
            .collect()
    }

    /// Compare one employee's desired and actual access without changing
    /// anything.
    pub async fn review(&self, employee_id: &str) -> Result<AccessReview, SyncError> {
        let employee = self
            .directory
            .get(employee_id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(employee_id.to_string()))?;
        let policy = self.policy.snapshot()?;
        let desired = EntitlementResolver::new().desired_for(&employee, &policy);

        let timeout = self.config.provisioner_timeout();
        let mut current = EntitlementSet::new();
        for adapter in self.adapters.iter() {
            let held = with_timeout(adapter.system(), timeout, adapter.fetch_current(&employee.email)).await?;
            current.merge(&held);
        }

        Ok(AccessReview::new(
            employee.id,
            employee.email,
            employee.status,
            desired,
            current,
        ))
    }

    /// What-if analysis of `update` against the active policy.
    pub async fn preview(&self, update: &PolicyUpdate, limit: usize) -> Result<ImpactReport, SyncError> {
        let policy = self.policy.snapshot()?;
        let employees = self.directory.list().await?;
        Ok(preview_impact(&policy, update, &employees, limit)?)
    }
}

/// Everything one employee task needs, detached from the orchestrator so it
/// can move onto the pool.
#[derive(Clone)]
struct Worker {
    policy: Arc<Policy>,
    adapters: Adapters,
    locks: Arc<IdentityLocks>,
    resolver: EntitlementResolver,
    timeout: Duration,
    dry_run: bool,
}

impl Worker {
    async fn reconcile(&self, employee: Employee) -> EmployeeResult {
        let identity = employee.email.clone();
        let _guards = self.locks.acquire(&identity, self.adapters.iter().map(|a| a.system())).await;

        let desired = self.resolver.desired_for(&employee, &self.policy);

        let mut current = EntitlementSet::new();
        let mut errors = Vec::new();
        let mut unreachable = BTreeSet::new();
        for adapter in self.adapters.iter() {
            match with_timeout(adapter.system(), self.timeout, adapter.fetch_current(&identity)).await {
                Ok(held) => current.merge(&held),
                Err(e) => {
                    tracing::warn!(system = adapter.system(), error = %e, "Could not fetch current access");
                    unreachable.insert(adapter.system().to_string());
                    errors.push(e.to_string());
                }
            }
        }

        let plan = plan(&desired, &current);
        let access_cleared = employee.is_terminated() && !current.is_empty();
        if access_cleared {
            if self.dry_run {
                tracing::warn!(entitlements = current.len(), "Would clear access for terminated employee");
            } else {
                tracing::warn!(entitlements = current.len(), "Clearing access for terminated employee");
            }
        }

        let mut applied = Vec::new();
        if !self.dry_run {
            for adapter in self.adapters.iter() {
                let system = adapter.system();
                // Without a fresh read the plan for this system is unsafe.
                if unreachable.contains(system) || !plan.iter().any(|a| a.targets(system)) {
                    continue;
                }
                match with_timeout(system, self.timeout, adapter.apply(&identity, &plan)).await {
                    Ok(done) => applied.extend(done.into_iter().filter(|a: &Action| a.targets(system))),
                    Err(e) => {
                        tracing::warn!(system, error = %e, "Could not apply plan");
                        errors.push(e.to_string());
                    }
                }
            }
        }

        let outcome = if errors.is_empty() {
            EmployeeOutcome::Succeeded
        } else {
            EmployeeOutcome::Failed {
                error: errors.join("; "),
            }
        };
        tracing::debug!(planned = plan.len(), applied = applied.len(), ?outcome, "Reconciled employee");

        EmployeeResult {
            employee_id: employee.id,
            identity,
            status: employee.status,
            desired,
            current,
            plan,
            applied,
            access_cleared,
            outcome,
        }
    }
}

async fn with_timeout<T>(
    system: &str,
    timeout: Duration,
    call: impl Future<Output = Result<T, ProvisionerError>>,
) -> Result<T, ProvisionerError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ProvisionerError::Timeout {
            system: system.to_string(),
            timeout,
        })?
}

fn unprocessed(employee: &Employee, outcome: EmployeeOutcome) -> EmployeeResult {
    EmployeeResult {
        employee_id: employee.id.clone(),
        identity: employee.email.clone(),
        status: employee.status,
        desired: EntitlementSet::new(),
        current: EntitlementSet::new(),
        plan: Vec::new(),
        applied: Vec::new(),
        access_cleared: false,
        outcome,
    }
}

type LockKey = (String, String);

/// One async mutex per `(identity, system)`, so overlapping runs never
/// interleave calls for the same account.
///
/// Entries only live while someone holds or waits for them.
#[derive(Default)]
struct IdentityLocks {
    inner: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    /// Lock every listed system for `identity`, always in the given order.
    async fn acquire<'a>(
        self: &Arc<Self>,
        identity: &str,
        systems: impl Iterator<Item = &'a str>,
    ) -> IdentityGuard {
        let keys: Vec<LockKey> = systems
            .map(|system| (identity.to_string(), system.to_string()))
            .collect();
        let locks: Vec<_> = {
            let mut inner = self.table();
            keys.iter()
                .map(|key| inner.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        IdentityGuard {
            guards,
            keys,
            locks: Arc::clone(self),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held for one employee's pipeline. Dropping it releases the locks and
/// forgets any that nobody else is waiting on.
struct IdentityGuard {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<LockKey>,
    locks: Arc<IdentityLocks>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut table = self.locks.table();
        for key in &self.keys {
            // The table's own handle is the only one left.
            if table.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                table.remove(key);
            }
        }
    }
}
