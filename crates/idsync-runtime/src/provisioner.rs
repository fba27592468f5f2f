//! Target-system adapters.

use crate::error::ProvisionerError;
use async_trait::async_trait;
use idsync_core::{Action, ActionKind, EntitlementSet, ProvisionerConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Reads and mutates entitlements in one target system.
///
/// Implementations must be safe to call concurrently for different
/// identities; the orchestrator serializes calls for the same
/// `(identity, system)` pair.
#[async_trait]
pub trait ProvisionerAdapter: Send + Sync {
    /// Name of the system this adapter owns, e.g. `google`.
    fn system(&self) -> &str;

    /// Everything `identity` currently holds in this system.
    ///
    /// An identity the system has never seen yields empty lists for each
    /// managed kind, not an error.
    async fn fetch_current(&self, identity: &str) -> Result<EntitlementSet, ProvisionerError>;

    /// Execute the actions in `plan` that target this system.
    ///
    /// Actions for other systems are ignored. Adding something already
    /// present or removing something absent succeeds. Returns the plan as
    /// received.
    async fn apply(&self, identity: &str, plan: &[Action]) -> Result<Vec<Action>, ProvisionerError>;
}

type Holdings = BTreeMap<String, EntitlementSet>;

/// Adapter backed by an in-process table, optionally mirrored to a JSON
/// file so state survives restarts.
///
/// Stands in for a real directory or code-hosting API in local setups and
/// tests.
#[derive(Debug)]
pub struct LocalProvisioner {
    system: String,
    kinds: Vec<String>,
    state: RwLock<Holdings>,
    snapshot: Option<PathBuf>,
}

impl LocalProvisioner {
    pub fn new(system: impl Into<String>, kinds: &[&str]) -> Self {
        Self {
            system: system.into(),
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            state: RwLock::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// Directory groups keyed by group email.
    pub fn google() -> Self {
        Self::new("google", &["groups"])
    }

    /// Code-hosting teams keyed by team slug.
    pub fn github() -> Self {
        Self::new("github", &["teams"])
    }

    /// Build from configuration, loading the snapshot file when one is
    /// configured and already exists.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ProvisionerError> {
        let kinds: Vec<&str> = config.kinds.iter().map(String::as_str).collect();
        let provisioner = Self::new(config.system.clone(), &kinds);
        match &config.state_path {
            Some(path) => provisioner.with_snapshot(path),
            None => Ok(provisioner),
        }
    }

    /// Mirror state to `path`, loading it first if the file exists.
    pub fn with_snapshot(mut self, path: impl AsRef<Path>) -> Result<Self, ProvisionerError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| self.state_error(e))?;
            let holdings: Holdings = serde_json::from_str(&content).map_err(|e| self.state_error(e))?;
            tracing::debug!(
                system = %self.system,
                identities = holdings.len(),
                path = %path.display(),
                "Loaded provisioner snapshot"
            );
            self.state = RwLock::new(holdings);
        }
        self.snapshot = Some(path);
        Ok(self)
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Give `identity` the listed names directly, bypassing any plan.
    pub fn seed(&self, identity: &str, kind: &str, names: &[&str]) -> Result<(), ProvisionerError> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        state
            .entry(identity.to_string())
            .or_default()
            .grant(&self.system, kind, names.iter().copied());
        Ok(())
    }

    fn empty_holdings(&self) -> EntitlementSet {
        let mut set = EntitlementSet::new();
        set.ensure_system(&self.system, self.kinds.iter().map(String::as_str));
        set
    }

    fn manages(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }

    fn persist(&self, holdings: &Holdings) -> Result<(), ProvisionerError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(holdings).map_err(|e| self.state_error(e))?;
        write_atomic(path, &json).map_err(|e| self.state_error(e))
    }

    fn state_error(&self, source: impl Into<anyhow::Error>) -> ProvisionerError {
        ProvisionerError::State {
            system: self.system.clone(),
            source: source.into(),
        }
    }

    fn poisoned(&self) -> ProvisionerError {
        self.state_error(anyhow::anyhow!("state lock poisoned"))
    }
}

#[async_trait]
impl ProvisionerAdapter for LocalProvisioner {
    fn system(&self) -> &str {
        &self.system
    }

    async fn fetch_current(&self, identity: &str) -> Result<EntitlementSet, ProvisionerError> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        let mut current = self.empty_holdings();
        if let Some(held) = state.get(identity) {
            current.merge(&held.restrict_to(&self.system));
        }
        Ok(current)
    }

    async fn apply(&self, identity: &str, plan: &[Action]) -> Result<Vec<Action>, ProvisionerError> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        // Changes land on a copy; the table only moves once the snapshot is
        // written.
        let mut next = state.clone();
        let held = next.entry(identity.to_string()).or_default();

        for action in plan.iter().filter(|a| a.targets(&self.system)) {
            if !self.manages(&action.kind) {
                tracing::warn!(
                    system = %self.system,
                    kind = %action.kind,
                    name = %action.name,
                    "Skipping action for unmanaged kind"
                );
                continue;
            }
            let changed = match action.action {
                ActionKind::Add => held.insert(&self.system, &action.kind, action.name.clone()),
                ActionKind::Remove => held.remove(&self.system, &action.kind, &action.name),
            };
            tracing::debug!(system = %self.system, identity, %action, changed, "Applied action");
        }

        self.persist(&next)?;
        *state = next;
        Ok(plan.to_vec())
    }
}

/// Write `content` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)
}
