//! Git automation collaborator.
//!
//! When a milestone is completed by hand, the engine can record the event as
//! a git commit and ask for a completion summary built from recent history.
//! Both operations sit behind [`GitAutomation`] so the engine never depends
//! on a working `git` binary:
//!
//! - `GitCli` - shells out to `git` in the repository
//! - `DisabledGitAutomation` - never commits, composes summaries locally

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::models::{DependencySummary, Milestone};
use crate::{Error, Result};

/// Completion summaries shorter than this are regenerated.
pub const MIN_COMPLETION_SUMMARY_LEN: usize = 20;

/// Number of commit subjects quoted in a generated summary.
const RECENT_COMMITS: usize = 5;

/// Context handed to [`GitAutomation::auto_commit_milestone`].
#[derive(Debug, Clone, Default)]
pub struct CommitContext {
    pub dependency_summary: Option<DependencySummary>,
    pub reason: String,
    pub actor: Option<String>,
}

/// Outcome of an auto-commit attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAutomationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl GitAutomationResult {
    pub fn committed(commit: impl Into<String>) -> Self {
        Self {
            success: true,
            reason: None,
            commit: Some(commit.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            commit: None,
        }
    }
}

/// Hooks the engine calls around milestone completion.
#[async_trait]
pub trait GitAutomation: Send + Sync {
    /// Record a completed milestone. Failures are reported, never raised.
    async fn auto_commit_milestone(
        &self,
        milestone: &Milestone,
        context: &CommitContext,
    ) -> GitAutomationResult;

    /// Produce a completion summary of at least
    /// [`MIN_COMPLETION_SUMMARY_LEN`] characters.
    async fn generate_completion_summary(
        &self,
        milestone: &Milestone,
        dependency_summary: Option<&DependencySummary>,
    ) -> Result<String>;
}

/// Summary text from the milestone, its dependencies and recent commits.
pub fn compose_completion_summary(
    milestone: &Milestone,
    dependency_summary: Option<&DependencySummary>,
    recent_commits: &[String],
) -> String {
    let mut summary = format!("Milestone {} ({}) completed", milestone.title, milestone.id);

    if let Some(deps) = dependency_summary.filter(|d| d.total > 0) {
        summary.push_str(&format!(
            " with {}/{} dependencies complete",
            deps.completed, deps.total
        ));
    }
    let linked = milestone.linked_tickets.len()
        + milestone.linked_features.len()
        + milestone.linked_modules.len();
    if linked > 0 {
        summary.push_str(&format!(", covering {} linked items", linked));
    }
    summary.push('.');

    if !recent_commits.is_empty() {
        summary.push_str(" Recent work: ");
        summary.push_str(&recent_commits.join("; "));
        summary.push('.');
    }
    summary
}

/// Commit message for a completed milestone.
pub fn commit_message(milestone: &Milestone) -> String {
    format!("roadmap: complete {} ({})", milestone.title, milestone.id)
}

/// Git automation backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    state_path: PathBuf,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            state_path: state_path.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| Error::Other(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// State file path relative to the repository, when it lives inside it.
    fn tracked_state_path(&self) -> Option<String> {
        let repo = self.repo_path.canonicalize().ok()?;
        let state = self.state_path.canonicalize().ok()?;
        state
            .strip_prefix(&repo)
            .ok()
            .map(Path::to_string_lossy)
            .map(|p| p.to_string())
    }

    async fn commit(&self, message: &str) -> Result<String> {
        match self.tracked_state_path() {
            Some(relative) => {
                self.git(&["add", "--", &relative]).await?;
                self.git(&["commit", "--allow-empty", "--only", "-m", message, "--", &relative])
                    .await?;
            }
            // State kept outside the work tree: record an empty commit and
            // leave whatever the user has staged alone
            None => {
                self.git(&["commit", "--allow-empty", "--only", "-m", message])
                    .await?;
            }
        }
        self.git(&["rev-parse", "--short", "HEAD"]).await
    }
}

#[async_trait]
impl GitAutomation for GitCli {
    async fn auto_commit_milestone(
        &self,
        milestone: &Milestone,
        context: &CommitContext,
    ) -> GitAutomationResult {
        let message = commit_message(milestone);
        match self.commit(&message).await {
            Ok(commit) => {
                tracing::info!(
                    milestone = %milestone.id,
                    commit = %commit,
                    reason = %context.reason,
                    "recorded milestone completion commit"
                );
                GitAutomationResult::committed(commit)
            }
            Err(e) => {
                tracing::warn!(milestone = %milestone.id, error = %e, "milestone auto-commit failed");
                GitAutomationResult::failed(e.to_string())
            }
        }
    }

    async fn generate_completion_summary(
        &self,
        milestone: &Milestone,
        dependency_summary: Option<&DependencySummary>,
    ) -> Result<String> {
        let count = format!("-n{}", RECENT_COMMITS);
        let recent = match self.git(&["log", &count, "--format=%s"]).await {
            Ok(log) => log
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "no git history for completion summary");
                Vec::new()
            }
        };
        Ok(compose_completion_summary(milestone, dependency_summary, &recent))
    }
}

/// Git automation turned off by configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGitAutomation;

#[async_trait]
impl GitAutomation for DisabledGitAutomation {
    async fn auto_commit_milestone(
        &self,
        _milestone: &Milestone,
        _context: &CommitContext,
    ) -> GitAutomationResult {
        GitAutomationResult::failed("git automation disabled")
    }

    async fn generate_completion_summary(
        &self,
        milestone: &Milestone,
        dependency_summary: Option<&DependencySummary>,
    ) -> Result<String> {
        Ok(compose_completion_summary(milestone, dependency_summary, &[]))
    }
}
