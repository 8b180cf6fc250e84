//! Teardown engine: reverse-order deletion with a best-effort wait policy.
//!
//! The consumer stack is logically downstream of the producer's role, so
//! deletion runs consumer first, producer second. Whatever happens to one
//! stack, the engine moves on to the next: aborting partway would leave
//! orphaned state unreachable to a retry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Prompt;
use crate::deploy::{wait_with_policy, PollConfig, WaitPolicy};
use crate::errors::Result;
use crate::orchestrator::Providers;
use crate::provider::{StackProvider, StackStatus};
use crate::session::TeardownScope;

/// What happened to one stack during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum TeardownOutcome {
    /// The stack was deleted and the deletion reached a terminal state.
    Deleted,
    /// The provider had no record of the stack. A notice, not an error.
    NotFound,
    /// Deletion was issued but did not reach a terminal state in the bound.
    TimedOut,
    /// Deletion was issued or attempted but the provider reported a problem.
    Failed(String),
}

/// Result of one teardown invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    /// False when the operator declined the confirmation token.
    pub confirmed: bool,
    /// Per-stack outcomes, in processing order (consumer first).
    pub stacks: Vec<(String, TeardownOutcome)>,
    /// Local artifacts that were actually removed.
    pub removed_artifacts: Vec<PathBuf>,
}

impl TeardownReport {
    /// Report for a declined confirmation: no mutation happened.
    #[must_use]
    pub fn declined() -> Self {
        Self {
            confirmed: false,
            stacks: Vec::new(),
            removed_artifacts: Vec::new(),
        }
    }
}

/// Deletes both stacks in reverse dependency order and removes generated
/// local artifacts.
pub struct TeardownEngine<'a> {
    providers: Providers<'a>,
    prompt: &'a dyn Prompt,
    poll: PollConfig,
    artifact_dir: PathBuf,
}

impl<'a> TeardownEngine<'a> {
    /// Creates an engine removing artifacts from the current directory.
    #[must_use]
    pub fn new(providers: Providers<'a>, prompt: &'a dyn Prompt) -> Self {
        Self {
            providers,
            prompt,
            poll: PollConfig::default(),
            artifact_dir: PathBuf::from("."),
        }
    }

    /// Overrides the poll config.
    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Overrides where local artifacts are looked for.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Runs the teardown.
    ///
    /// The operator must type the scope's confirmation token before any
    /// deletion is issued; anything else aborts with success and zero
    /// mutation. That is a safety gate, not an error path.
    pub async fn teardown(&self, scope: &TeardownScope) -> Result<TeardownReport> {
        let answer = self.prompt.ask(
            &format!(
                "This deletes stacks '{}' and '{}'. Type '{}' to continue",
                scope.consumer_stack_name(),
                scope.producer_stack_name(),
                scope.confirm_token
            ),
            "",
        )?;
        if answer.trim() != scope.confirm_token {
            info!("confirmation declined, nothing deleted");
            return Ok(TeardownReport::declined());
        }

        let mut stacks = Vec::with_capacity(2);
        for (name, provider) in [
            (scope.consumer_stack_name(), self.providers.consumer),
            (scope.producer_stack_name(), self.providers.producer),
        ] {
            let outcome = self.delete_stack(provider, &name).await;
            info!(stack = %name, outcome = ?outcome, "stack processed");
            stacks.push((name, outcome));
        }

        let removed_artifacts = self.remove_local_artifacts(scope);

        Ok(TeardownReport {
            confirmed: true,
            stacks,
            removed_artifacts,
        })
    }

    /// Best-effort deletion of one stack. Never returns an error; failures
    /// become recorded outcomes so the next stack is always processed.
    async fn delete_stack(&self, provider: &dyn StackProvider, name: &str) -> TeardownOutcome {
        let view = match provider.describe(name).await {
            Ok(view) => view,
            Err(err) => {
                warn!(stack = name, error = %err, "describe failed, skipping");
                return TeardownOutcome::Failed(err.to_string());
            }
        };

        if matches!(view.status, StackStatus::Absent | StackStatus::DeleteComplete) {
            info!(stack = name, "not found, nothing to delete");
            return TeardownOutcome::NotFound;
        }

        if let Err(err) = provider.delete(name).await {
            warn!(stack = name, error = %err, "delete request failed");
            return TeardownOutcome::Failed(err.to_string());
        }

        match wait_with_policy(provider, name, &self.poll, WaitPolicy::BestEffort).await {
            Ok(Some(view))
                if matches!(
                    view.status,
                    StackStatus::DeleteComplete | StackStatus::Absent
                ) =>
            {
                TeardownOutcome::Deleted
            }
            Ok(Some(view)) => {
                warn!(stack = name, status = %view.status, "deletion ended in an unexpected state");
                TeardownOutcome::Failed(format!("deletion ended in {}", view.status))
            }
            Ok(None) => TeardownOutcome::TimedOut,
            Err(err) => {
                warn!(stack = name, error = %err, "wait failed, continuing");
                TeardownOutcome::Failed(err.to_string())
            }
        }
    }

    /// Removes every locally generated artifact. Missing files are not an
    /// error; cleanup has to be idempotent.
    fn remove_local_artifacts(&self, scope: &TeardownScope) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for path in scope.local_artifacts(&self.artifact_dir) {
            match remove_if_present(&path) {
                Ok(true) => {
                    info!(path = %path.display(), "artifact removed");
                    removed.push(path);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not remove artifact");
                }
            }
        }
        removed
    }
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
