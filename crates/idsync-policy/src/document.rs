//! The policy document.
//!
//! ```yaml
//! systems:
//!   google: [groups]
//!   github: [teams]
//! roles:
//!   Engineering:
//!     google: { groups: [eng@example.com] }
//!     github: { teams: [backend] }
//! rules:
//!   - when: location == "Remote"
//!     grant:
//!       github: { teams: [remote-access] }
//! ```

use crate::error::PolicyError;
use crate::rules::Predicate;
use idsync_core::EntitlementSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entitlements granted by a role or rule: system -> kind -> names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grant(pub BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl Grant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, system: &str, kind: &str, names: &[&str]) -> Self {
        self.0
            .entry(system.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Union every name of this grant into `set`.
    pub fn apply_to(&self, set: &mut EntitlementSet) {
        for (system, kinds) in &self.0 {
            for (kind, names) in kinds {
                set.grant(system, kind, names.iter().cloned());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().flat_map(|k| k.values()).all(Vec::is_empty)
    }
}

/// A rule granting entitlements when its predicate holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Predicate in the restricted `field == "literal"` / `field != "literal"` grammar.
    #[serde(alias = "predicate")]
    pub when: String,
    #[serde(default)]
    pub grant: Grant,
}

impl ConditionalRule {
    pub fn new(when: impl Into<String>, grant: Grant) -> Self {
        Self {
            when: when.into(),
            grant,
        }
    }
}

/// Role grants keyed by department plus ordered conditional rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Known systems and their entitlement kinds. Every desired set carries
    /// these, empty when nothing is granted.
    #[serde(default = "default_systems")]
    pub systems: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub roles: BTreeMap<String, Grant>,

    #[serde(default)]
    pub rules: Vec<ConditionalRule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            systems: default_systems(),
            roles: BTreeMap::new(),
            rules: Vec::new(),
        }
    }
}

fn default_systems() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("github".to_string(), vec!["teams".to_string()]),
        ("google".to_string(), vec!["groups".to_string()]),
    ])
}

impl Policy {
    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, PolicyError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let policy: Self = serde_yaml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn to_yaml(&self) -> Result<String, PolicyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// An entitlement set with every known system present and empty.
    pub fn empty_entitlements(&self) -> EntitlementSet {
        let mut set = EntitlementSet::new();
        for (system, kinds) in &self.systems {
            set.ensure_system(system, kinds.iter().cloned());
        }
        set
    }

    /// Structural checks. Predicates are not checked here: a rule that
    /// does not parse simply never fires.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let grants = self
            .roles
            .iter()
            .map(|(dept, grant)| (format!("role '{dept}'"), grant))
            .chain(
                self.rules
                    .iter()
                    .enumerate()
                    .map(|(i, rule)| (format!("rule {i}"), &rule.grant)),
            );

        for (owner, grant) in grants {
            for (system, kinds) in &grant.0 {
                if system.trim().is_empty() {
                    return Err(PolicyError::Invalid(format!("{owner} grants an unnamed system")));
                }
                for (kind, names) in kinds {
                    if kind.trim().is_empty() {
                        return Err(PolicyError::Invalid(format!(
                            "{owner} grants an unnamed kind in '{system}'"
                        )));
                    }
                    if names.iter().any(|n| n.trim().is_empty()) {
                        return Err(PolicyError::Invalid(format!(
                            "{owner} grants an empty entitlement name in '{system}.{kind}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Indexes and errors of rules whose predicate will never match because
    /// it cannot be parsed.
    pub fn lint(&self) -> Vec<(usize, String)> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| Predicate::parse(&rule.when).err().map(|e| (i, e.to_string())))
            .collect()
    }
}

/// A bulk change to the policy.
///
/// Roles listed here replace those departments' grants (others are left
/// alone). When `rules` is present the whole rule list is replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub roles: Option<BTreeMap<String, Grant>>,
    #[serde(default)]
    pub rules: Option<Vec<ConditionalRule>>,
}

impl PolicyUpdate {
    pub fn apply_to(&self, policy: &mut Policy) {
        if let Some(roles) = &self.roles {
            for (department, grant) in roles {
                policy.roles.insert(department.clone(), grant.clone());
            }
        }
        if let Some(rules) = &self.rules {
            policy.rules = rules.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_none() && self.rules.is_none()
    }
}
