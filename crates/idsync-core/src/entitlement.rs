//! The entitlement shape shared by desired and current state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

type Kinds = BTreeMap<String, BTreeSet<String>>;

/// Entitlements grouped by target system and entitlement kind.
///
/// ```text
/// { "google": { "groups": ["eng@example.com"] }, "github": { "teams": [] } }
/// ```
///
/// Backed by ordered maps and sets, so names are always deduplicated and
/// iterate (and serialize) in sorted order. A system or kind may be present
/// with an empty list; such entries are "known" but grant nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitlementSet(BTreeMap<String, Kinds>);

impl EntitlementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `system` is present with an (possibly empty) list for each kind.
    pub fn ensure_system<I, S>(&mut self, system: &str, kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.0.entry(system.to_string()).or_default();
        for kind in kinds {
            entry.entry(kind.into()).or_default();
        }
    }

    /// Add every name in `names` under `system`/`kind`.
    pub fn grant<I, S>(&mut self, system: &str, kind: &str, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self
            .0
            .entry(system.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default();
        set.extend(names.into_iter().map(Into::into));
    }

    /// Insert a single name. Returns `false` if it was already present.
    pub fn insert(&mut self, system: &str, kind: &str, name: impl Into<String>) -> bool {
        self.0
            .entry(system.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .insert(name.into())
    }

    /// Remove a single name. Returns `false` if it was not present.
    pub fn remove(&mut self, system: &str, kind: &str, name: &str) -> bool {
        self.0
            .get_mut(system)
            .and_then(|kinds| kinds.get_mut(kind))
            .map(|set| set.remove(name))
            .unwrap_or(false)
    }

    /// Union `other` into `self`, keeping empty systems/kinds from both sides.
    pub fn merge(&mut self, other: &EntitlementSet) {
        for (system, kinds) in &other.0 {
            let entry = self.0.entry(system.clone()).or_default();
            for (kind, names) in kinds {
                entry
                    .entry(kind.clone())
                    .or_default()
                    .extend(names.iter().cloned());
            }
        }
    }

    pub fn contains(&self, system: &str, kind: &str, name: &str) -> bool {
        self.names(system, kind)
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }

    pub fn names(&self, system: &str, kind: &str) -> Option<&BTreeSet<String>> {
        self.0.get(system).and_then(|kinds| kinds.get(kind))
    }

    pub fn system(&self, system: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        self.0.get(system)
    }

    /// Iterate systems in sorted order.
    pub fn systems(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, BTreeSet<String>>)> {
        self.0.iter()
    }

    /// A copy holding only `system`, or an empty set if it is absent.
    pub fn restrict_to(&self, system: &str) -> EntitlementSet {
        let mut out = EntitlementSet::new();
        if let Some(kinds) = self.0.get(system) {
            out.0.insert(system.to_string(), kinds.clone());
        }
        out
    }

    /// Total number of entitlement names across all systems and kinds.
    pub fn len(&self) -> usize {
        self.0
            .values()
            .flat_map(|kinds| kinds.values())
            .map(BTreeSet::len)
            .sum()
    }

    /// `true` when no system grants any name (known-but-empty lists don't count).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<BTreeMap<String, BTreeMap<String, BTreeSet<String>>>> for EntitlementSet {
    fn from(map: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>) -> Self {
        Self(map)
    }
}
