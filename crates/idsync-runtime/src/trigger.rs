//! Sync requests passed from event sources to the scheduler.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Why a sync was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerReason {
    Schedule,
    OnDemand,
    HrImport { records: usize },
    Termination { employee_id: String },
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::OnDemand => write!(f, "on-demand"),
            Self::HrImport { records } => write!(f, "hr import ({records} records)"),
            Self::Termination { employee_id } => write!(f, "termination of {employee_id}"),
        }
    }
}

/// A request to run one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCommand {
    pub dry_run: bool,
    pub actor: String,
    pub reason: TriggerReason,
}

impl SyncCommand {
    pub fn new(dry_run: bool, actor: impl Into<String>, reason: TriggerReason) -> Self {
        Self {
            dry_run,
            actor: actor.into(),
            reason,
        }
    }
}

/// Sending half of the sync request queue.
///
/// Emitting never blocks: a full or closed queue is reported to the caller,
/// who decides whether that matters.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncTrigger {
    /// Create a trigger and the receiver a scheduler drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// A trigger nobody listens to. Every emit fails with `Closed`.
    pub fn detached() -> Self {
        Self::channel(1).0
    }

    pub fn emit(&self, command: SyncCommand) -> Result<(), mpsc::error::TrySendError<SyncCommand>> {
        tracing::debug!(
            dry_run = command.dry_run,
            actor = %command.actor,
            reason = %command.reason,
            "Requesting sync"
        );
        self.tx.try_send(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_commands_reach_receiver() {
        let (trigger, mut rx) = SyncTrigger::channel(4);
        trigger
            .emit(SyncCommand::new(
                false,
                "hr",
                TriggerReason::Termination {
                    employee_id: "E1".to_string(),
                },
            ))
            .unwrap();

        let command = rx.recv().await.unwrap();
        assert!(!command.dry_run);
        assert_eq!(command.reason.to_string(), "termination of E1");
    }

    #[test]
    fn detached_trigger_reports_closed() {
        let result = SyncTrigger::detached().emit(SyncCommand::new(true, "a", TriggerReason::OnDemand));
        assert!(matches!(result, Err(mpsc::error::TrySendError::Closed(_))));
    }

    #[test]
    fn full_queue_is_reported() {
        let (trigger, _rx) = SyncTrigger::channel(1);
        trigger
            .emit(SyncCommand::new(true, "a", TriggerReason::Schedule))
            .unwrap();
        let second = trigger.emit(SyncCommand::new(true, "a", TriggerReason::Schedule));
        assert!(matches!(second, Err(mpsc::error::TrySendError::Full(_))));
    }
}
