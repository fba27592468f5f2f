//! The employee system of record.

use crate::error::DirectoryError;
use crate::provisioner::write_atomic;
use async_trait::async_trait;
use idsync_core::{Employee, EmploymentStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Read access to employee records.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// Every employee, in directory order.
    async fn list(&self) -> Result<Vec<Employee>, DirectoryError>;

    async fn get(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError>;

    /// Pick up changes made by other processes. In-memory directories have
    /// nothing to do.
    async fn refresh(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// Partial update to one employee. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeeUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub status: Option<EmploymentStatus>,
}

impl EmployeeUpdate {
    pub fn terminate() -> Self {
        Self {
            status: Some(EmploymentStatus::Terminated),
            ..Default::default()
        }
    }

    fn apply_to(&self, employee: &mut Employee) {
        macro_rules! patch {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    employee.$field = value.clone().into();
                })*
            };
        }
        patch!(email, first_name, last_name, department, title, location, employment_type);
        if let Some(status) = self.status {
            employee.status = status;
        }
    }
}

/// Counts from [`LocalDirectory::upsert_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub created: usize,
    pub updated: usize,
    /// Employees whose status moved to `Terminated` with this batch.
    pub newly_terminated: Vec<String>,
}

/// Result of [`LocalDirectory::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub employee: Employee,
    pub previous: EmploymentStatus,
}

impl StatusChange {
    /// `true` when this update is what terminated the employee.
    pub fn terminated(&self) -> bool {
        !self.previous.is_terminated() && self.employee.is_terminated()
    }
}

/// In-process directory keyed by employee id, optionally mirrored to a JSON
/// array on disk.
#[derive(Debug, Default)]
pub struct LocalDirectory {
    employees: RwLock<Vec<Employee>>,
    path: Option<PathBuf>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_employees(employees: Vec<Employee>) -> Self {
        Self {
            employees: RwLock::new(employees),
            path: None,
        }
    }

    /// Open a file-backed directory. A missing file is an empty directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref().to_path_buf();
        let employees = read_employees(&path)?;

        Ok(Self {
            employees: RwLock::new(employees),
            path: Some(path),
        })
    }

    /// Insert new employees and replace existing ones, matched by id.
    ///
    /// Nothing changes unless the whole batch is written to disk.
    pub fn upsert_many(&self, records: Vec<Employee>) -> Result<UpsertReport, DirectoryError> {
        let mut employees = self.employees.write().map_err(|_| poisoned())?;
        let mut next = employees.clone();
        let mut report = UpsertReport::default();

        for record in records {
            match next.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => {
                    if !existing.is_terminated() && record.is_terminated() {
                        report.newly_terminated.push(record.id.clone());
                    }
                    *existing = record;
                    report.updated += 1;
                }
                None => {
                    next.push(record);
                    report.created += 1;
                }
            }
        }

        self.persist(&next)?;
        *employees = next;
        Ok(report)
    }

    /// Patch one employee.
    pub fn update(&self, employee_id: &str, update: &EmployeeUpdate) -> Result<StatusChange, DirectoryError> {
        let mut employees = self.employees.write().map_err(|_| poisoned())?;
        let mut next = employees.clone();
        let employee = next
            .iter_mut()
            .find(|e| e.id == employee_id)
            .ok_or_else(|| DirectoryError::NotFound(employee_id.to_string()))?;

        let previous = employee.status;
        update.apply_to(employee);
        let change = StatusChange {
            employee: employee.clone(),
            previous,
        };

        self.persist(&next)?;
        *employees = next;
        Ok(change)
    }

    fn persist(&self, employees: &[Employee]) -> Result<(), DirectoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(employees).map_err(unavailable)?;
        write_atomic(path, &json).map_err(unavailable)
    }
}

#[async_trait]
impl EmployeeDirectory for LocalDirectory {
    async fn list(&self) -> Result<Vec<Employee>, DirectoryError> {
        Ok(self.employees.read().map_err(|_| poisoned())?.clone())
    }

    async fn get(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError> {
        let employees = self.employees.read().map_err(|_| poisoned())?;
        Ok(employees.iter().find(|e| e.id == employee_id).cloned())
    }

    /// Re-read the mirror file, which imports in other processes rewrite.
    async fn refresh(&self) -> Result<(), DirectoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let employees = read_employees(path)?;
        tracing::debug!(path = %path.display(), employees = employees.len(), "Refreshed employee directory");
        *self.employees.write().map_err(|_| poisoned())? = employees;
        Ok(())
    }
}

/// A missing file is an empty directory.
fn read_employees(path: &Path) -> Result<Vec<Employee>, DirectoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(unavailable)?;
    serde_json::from_str(&content).map_err(unavailable)
}

fn unavailable(err: impl std::fmt::Display) -> DirectoryError {
    DirectoryError::Unavailable(err.to_string())
}

fn poisoned() -> DirectoryError {
    DirectoryError::Unavailable("directory lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_matches_by_id() {
        let directory = LocalDirectory::with_employees(vec![
            Employee::new("E1", "a@x.com").with_department("Sales"),
        ]);

        let report = directory
            .upsert_many(vec![
                Employee::new("E1", "a@x.com").with_department("Engineering"),
                Employee::new("E2", "b@x.com"),
            ])
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert!(report.newly_terminated.is_empty());

        let e1 = directory.get("E1").await.unwrap().unwrap();
        assert_eq!(e1.department.as_deref(), Some("Engineering"));
        let ids: Vec<String> = directory.list().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["E1", "E2"]);
    }

    #[test]
    fn upsert_reports_terminations() {
        let directory = LocalDirectory::with_employees(vec![Employee::new("E1", "a@x.com")]);
        let report = directory
            .upsert_many(vec![
                Employee::new("E1", "a@x.com").with_status(EmploymentStatus::Terminated),
            ])
            .unwrap();
        assert_eq!(report.newly_terminated, ["E1"]);
    }

    #[test]
    fn update_patches_fields_and_reports_transition() {
        let directory = LocalDirectory::with_employees(vec![
            Employee::new("E1", "a@x.com").with_title("SE"),
        ]);

        let change = directory
            .update(
                "E1",
                &EmployeeUpdate {
                    location: Some("Remote".to_string()),
                    ..EmployeeUpdate::terminate()
                },
            )
            .unwrap();

        assert!(change.terminated());
        assert_eq!(change.employee.title.as_deref(), Some("SE"));
        assert_eq!(change.employee.location.as_deref(), Some("Remote"));

        let again = directory.update("E1", &EmployeeUpdate::terminate()).unwrap();
        assert!(!again.terminated());
    }

    #[test]
    fn update_unknown_employee_fails() {
        let err = LocalDirectory::new()
            .update("missing", &EmployeeUpdate::default())
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn file_backed_directory_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("employees.json");

        let directory = LocalDirectory::open(&path).unwrap();
        directory
            .upsert_many(vec![Employee::new("E1", "a@x.com")])
            .unwrap();

        let reopened = LocalDirectory::open(&path).unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    /// A path whose parent is a regular file cannot be written.
    fn unwritable(dir: &Path) -> PathBuf {
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "").unwrap();
        blocker.join("employees.json")
    }

    #[tokio::test]
    async fn failed_write_leaves_directory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let directory = LocalDirectory {
            employees: RwLock::new(vec![Employee::new("E1", "a@x.com")]),
            path: Some(unwritable(dir.path())),
        };

        let err = directory
            .upsert_many(vec![Employee::new("E2", "b@x.com")])
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));

        let err = directory.update("E1", &EmployeeUpdate::terminate()).unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));

        let listed = directory.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_terminated());
    }

    #[tokio::test]
    async fn refresh_picks_up_writes_from_another_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("employees.json");
        let reader = LocalDirectory::open(&path).unwrap();

        let writer = LocalDirectory::open(&path).unwrap();
        writer
            .upsert_many(vec![Employee::new("E1", "a@x.com")])
            .unwrap();
        assert!(reader.list().await.unwrap().is_empty());

        reader.refresh().await.unwrap();
        assert_eq!(reader.list().await.unwrap().len(), 1);
    }
}
