//! `idsync policy` subcommands.

use super::App;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use idsync_policy::{ConditionalRule, Grant, PolicyUpdate, DEFAULT_PREVIEW_SAMPLE};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Print the active policy as YAML.
    Show,

    /// Create or replace a department's grant.
    SetRole {
        department: String,

        /// `system.kind=name1,name2`; repeat for several kinds.
        #[arg(long = "grant", required = true)]
        grants: Vec<String>,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Remove a department's grant.
    DeleteRole {
        department: String,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Append a conditional rule.
    AddRule {
        /// Predicate, e.g. `location == "Remote"`.
        #[arg(long)]
        when: String,

        /// `system.kind=name1,name2`; repeat for several kinds.
        #[arg(long = "grant", required = true)]
        grants: Vec<String>,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Remove the rule at a zero-based index.
    DeleteRule {
        index: usize,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Replace roles and/or rules from a YAML update document.
    Apply {
        file: PathBuf,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Show how an update document would change access, without saving it.
    Preview {
        file: PathBuf,

        /// Number of active employees to sample.
        #[arg(long, default_value_t = DEFAULT_PREVIEW_SAMPLE)]
        limit: usize,
    },

    /// Check the active policy for rules that can never match.
    Validate,
}

pub async fn run_policy(app: &App, cmd: PolicyCommand) -> Result<()> {
    match cmd {
        PolicyCommand::Show => {
            let policy = app.policy.snapshot()?;
            print!("{}", policy.to_yaml()?);
        }
        PolicyCommand::SetRole {
            department,
            grants,
            actor,
        } => {
            let grant = parse_grants(&grants)?;
            app.policy.upsert_role(&app.actor(actor), &department, grant).await?;
            println!("Role '{department}' saved.");
        }
        PolicyCommand::DeleteRole { department, actor } => {
            app.policy.delete_role(&app.actor(actor), &department).await?;
            println!("Role '{department}' deleted.");
        }
        PolicyCommand::AddRule { when, grants, actor } => {
            let rule = ConditionalRule::new(when, parse_grants(&grants)?);
            let total = app.policy.add_rule(&app.actor(actor), rule).await?;
            println!("Rule added at index {}.", total - 1);
        }
        PolicyCommand::DeleteRule { index, actor } => {
            let rule = app.policy.delete_rule(&app.actor(actor), index).await?;
            println!("Deleted rule {index}: {}", rule.when);
        }
        PolicyCommand::Apply { file, actor } => {
            let update = read_update(&file)?;
            let report = app.policy.replace(&app.actor(actor), update).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        PolicyCommand::Preview { file, limit } => {
            let update = read_update(&file)?;
            let report = app.orchestrator()?.preview(&update, limit).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        PolicyCommand::Validate => {
            let policy = app.policy.snapshot()?;
            let problems = policy.lint();
            if problems.is_empty() {
                println!(
                    "Policy OK: {} roles, {} rules.",
                    policy.roles.len(),
                    policy.rules.len()
                );
            } else {
                for (index, problem) in &problems {
                    println!("rule {index}: {problem}");
                }
                bail!("{} rule(s) can never match", problems.len());
            }
        }
    }
    Ok(())
}

fn read_update(path: &Path) -> Result<PolicyUpdate> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let update: PolicyUpdate =
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    if update.is_empty() {
        bail!("{} has neither roles nor rules", path.display());
    }
    Ok(update)
}

/// Parse `system.kind=a,b` arguments into one grant.
fn parse_grants(args: &[String]) -> Result<Grant> {
    let mut grant = Grant::new();
    for arg in args {
        let Some((target, names)) = arg.split_once('=') else {
            bail!("grant '{arg}' is not of the form system.kind=name1,name2");
        };
        let Some((system, kind)) = target.split_once('.') else {
            bail!("grant target '{target}' is not of the form system.kind");
        };
        let names: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();
        if system.trim().is_empty() || kind.trim().is_empty() || names.is_empty() {
            bail!("grant '{arg}' needs a system, a kind and at least one name");
        }
        grant = grant.with(system.trim(), kind.trim(), &names);
    }
    Ok(grant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_grants() {
        let grant = parse_grants(&[
            "google.groups=eng@x.com, all@x.com".to_string(),
            "github.teams=backend".to_string(),
        ])
        .unwrap();

        assert_eq!(
            grant,
            Grant::new()
                .with("google", "groups", &["eng@x.com", "all@x.com"])
                .with("github", "teams", &["backend"])
        );
    }

    #[test]
    fn rejects_malformed_grants() {
        assert!(parse_grants(&["google=eng@x.com".to_string()]).is_err());
        assert!(parse_grants(&["google.groups".to_string()]).is_err());
        assert!(parse_grants(&["google.groups=".to_string()]).is_err());
    }
}
