//! Reconciliation planning.
//!
//! [`plan`] turns a desired and a current [`EntitlementSet`] into the
//! ordered list of [`Action`]s that moves current to desired. It is a pure
//! function, so it is safe to call for previews and what-if analysis.
//!
//! Ordering: systems in sorted order, then kinds in sorted order; within a
//! kind every `add` (sorted by name) comes before every `remove` (sorted by
//! name).

use idsync_core::{Action, ActionKind, EntitlementSet};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

static EMPTY: BTreeSet<String> = BTreeSet::new();

/// Compute the actions that move `current` to `desired`.
///
/// Every system/kind present on either side is considered. The result is
/// empty iff both sides grant exactly the same names.
pub fn plan(desired: &EntitlementSet, current: &EntitlementSet) -> Vec<Action> {
    let mut actions = Vec::new();

    let systems: BTreeSet<&String> = desired
        .systems()
        .chain(current.systems())
        .map(|(system, _)| system)
        .collect();

    for system in systems {
        let kinds: BTreeSet<&String> = desired
            .system(system)
            .into_iter()
            .chain(current.system(system))
            .flat_map(|kinds| kinds.keys())
            .collect();

        for kind in kinds {
            let want = desired.names(system, kind).unwrap_or(&EMPTY);
            let have = current.names(system, kind).unwrap_or(&EMPTY);

            actions.extend(
                want.difference(have)
                    .map(|name| Action::add(system.as_str(), kind.as_str(), name.as_str())),
            );
            actions.extend(
                have.difference(want)
                    .map(|name| Action::remove(system.as_str(), kind.as_str(), name.as_str())),
            );
        }
    }

    tracing::trace!(actions = actions.len(), "Planned reconciliation");
    actions
}

/// `true` when `desired` and `current` grant the same names everywhere.
pub fn is_compliant(desired: &EntitlementSet, current: &EntitlementSet) -> bool {
    plan(desired, current).is_empty()
}

/// Apply `actions` to `state` in memory.
///
/// Adds of present names and removes of absent names are no-ops. Used to
/// simulate the effect of a plan without touching a target system.
pub fn apply_plan(state: &mut EntitlementSet, actions: &[Action]) {
    for action in actions {
        match action.action {
            ActionKind::Add => {
                state.insert(&action.target, &action.kind, action.name.clone());
            }
            ActionKind::Remove => {
                state.remove(&action.target, &action.kind, &action.name);
            }
        }
    }
}

/// Counts over a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanStats {
    pub adds: usize,
    pub removes: usize,
    pub systems: usize,
}

impl PlanStats {
    pub fn of(actions: &[Action]) -> Self {
        let adds = actions.iter().filter(|a| a.action == ActionKind::Add).count();
        let systems: HashSet<&str> = actions.iter().map(|a| a.target.as_str()).collect();
        Self {
            adds,
            removes: actions.len() - adds,
            systems: systems.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.adds + self.removes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&str, &str, &[&str])]) -> EntitlementSet {
        let mut set = EntitlementSet::new();
        for (system, kind, names) in entries {
            set.grant(system, kind, names.iter().copied());
        }
        set
    }

    #[test]
    fn adds_missing_and_removes_extra() {
        let desired = set(&[("google", "groups", &["a", "b"])]);
        let current = set(&[("google", "groups", &["b", "c"])]);

        assert_eq!(
            plan(&desired, &current),
            vec![
                Action::add("google", "groups", "a"),
                Action::remove("google", "groups", "c"),
            ]
        );
    }

    #[test]
    fn equal_sets_produce_empty_plan() {
        let desired = set(&[("google", "groups", &["a"]), ("github", "teams", &[])]);
        assert!(plan(&desired, &desired.clone()).is_empty());
        assert!(is_compliant(&desired, &desired));
    }

    #[test]
    fn known_but_empty_lists_match_missing_systems() {
        let mut desired = EntitlementSet::new();
        desired.ensure_system("github", ["teams"]);
        assert!(plan(&desired, &EntitlementSet::new()).is_empty());
    }

    #[test]
    fn system_only_in_current_is_cleared() {
        let desired = set(&[("google", "groups", &[])]);
        let current = set(&[("github", "teams", &["backend", "alpha"])]);

        assert_eq!(
            plan(&desired, &current),
            vec![
                Action::remove("github", "teams", "alpha"),
                Action::remove("github", "teams", "backend"),
            ]
        );
    }

    #[test]
    fn ordering_is_by_system_then_kind_with_adds_first() {
        let desired = set(&[
            ("google", "groups", &["g2", "g1"]),
            ("github", "teams", &["t1"]),
            ("github", "repos", &["r1"]),
        ]);
        let current = set(&[("google", "groups", &["g0"]), ("github", "teams", &["t0"])]);

        let actions: Vec<String> = plan(&desired, &current).iter().map(|a| a.to_string()).collect();
        assert_eq!(
            actions,
            [
                "add github.repos r1",
                "add github.teams t1",
                "remove github.teams t0",
                "add google.groups g1",
                "add google.groups g2",
                "remove google.groups g0",
            ]
        );
    }

    #[test]
    fn applying_plan_reaches_desired_state() {
        let desired = set(&[("google", "groups", &["a", "b"]), ("github", "teams", &["x"])]);
        let mut current = set(&[("google", "groups", &["b", "c"]), ("github", "teams", &["y"])]);

        let actions = plan(&desired, &current);
        apply_plan(&mut current, &actions);

        assert!(plan(&desired, &current).is_empty());
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let desired = set(&[("google", "groups", &["a"])]);
        let current = set(&[("google", "groups", &["z"])]);
        let actions = plan(&desired, &current);

        let mut once = current.clone();
        apply_plan(&mut once, &actions);
        let mut twice = current.clone();
        apply_plan(&mut twice, &actions);
        apply_plan(&mut twice, &actions);

        assert_eq!(once, twice);
    }

    #[test]
    fn plan_is_deterministic() {
        let desired = set(&[("google", "groups", &["m", "a", "z"])]);
        let current = set(&[("google", "groups", &["q", "b"])]);

        let first = serde_json::to_string(&plan(&desired, &current)).unwrap();
        let second = serde_json::to_string(&plan(&desired, &current)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stats_count_directions() {
        let actions = vec![
            Action::add("google", "groups", "a"),
            Action::add("github", "teams", "b"),
            Action::remove("github", "teams", "c"),
        ];
        let stats = PlanStats::of(&actions);
        assert_eq!(stats, PlanStats { adds: 2, removes: 1, systems: 2 });
        assert_eq!(stats.total(), 3);
    }
}
