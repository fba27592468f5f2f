//! HR employee records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Employment status as reported by HR.
///
/// Parsing is case-insensitive and ignores surrounding whitespace, so
/// `"terminated"`, `" TERMINATED "` and `"Terminated"` are the same status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmploymentStatus {
    #[default]
    Active,
    Terminated,
    Inactive,
}

impl EmploymentStatus {
    /// Canonical spelling, used in rule contexts and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Terminated => "Terminated",
            Self::Inactive => "Inactive",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is not one of the known statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown employment status '{0}' (expected Active, Terminated or Inactive)")]
pub struct UnknownStatus(pub String);

impl FromStr for EmploymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "terminated" => Ok(Self::Terminated),
            "inactive" => Ok(Self::Inactive),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for EmploymentStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EmploymentStatus> for String {
    fn from(status: EmploymentStatus) -> Self {
        status.as_str().to_string()
    }
}

/// One employee as delivered by the HR system of record.
///
/// `id` is the stable external identifier used for matching records across
/// imports; `email` is the identity used against target systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub status: EmploymentStatus,
}

impl Employee {
    /// Create an active employee with no optional attributes set.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            department: None,
            title: None,
            location: None,
            employment_type: None,
            status: EmploymentStatus::Active,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_employment_type(mut self, employment_type: impl Into<String>) -> Self {
        self.employment_type = Some(employment_type.into());
        self
    }

    pub fn with_status(mut self, status: EmploymentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminated()
    }
}
