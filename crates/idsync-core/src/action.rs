use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a reconciliation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Add,
    Remove,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One step of a reconciliation plan: add or remove `name` of `kind` in `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub target: String,
    pub action: ActionKind,
    pub kind: String,
    pub name: String,
}

impl Action {
    pub fn add(target: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: ActionKind::Add,
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn remove(
        target: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            action: ActionKind::Remove,
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn targets(&self, system: &str) -> bool {
        self.target == system
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{} {}", self.action, self.target, self.kind, self.name)
    }
}
