//! Provisioner (target system) configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One target system reconciled by a local provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// System name, matched against `Action::target`.
    pub system: String,

    /// Entitlement kinds this system manages (e.g. `groups`, `teams`).
    pub kinds: Vec<String>,

    /// Optional JSON snapshot persisting the provisioner's state between runs.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl ProvisionerConfig {
    pub fn new(system: impl Into<String>, kinds: &[&str]) -> Self {
        Self {
            system: system.into(),
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            state_path: None,
        }
    }
}

pub(crate) fn default_provisioners() -> Vec<ProvisionerConfig> {
    vec![
        ProvisionerConfig::new("google", &["groups"]),
        ProvisionerConfig::new("github", &["teams"]),
    ]
}
