//! `idsync audit` - query the audit trail.

use super::App;
use anyhow::Result;
use idsync_audit::AuditFilter;

pub async fn run_audit(app: &App, action: Option<String>, actor: Option<String>, limit: usize) -> Result<()> {
    let entries = app
        .audit
        .query(AuditFilter {
            action,
            actor,
            limit: Some(limit),
            newest_first: true,
            ..Default::default()
        })
        .await?;

    if entries.is_empty() {
        println!("No audit entries.");
    }
    for entry in entries {
        println!("{}", entry.to_log_line());
    }
    Ok(())
}
