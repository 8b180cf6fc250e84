//! Stack deployment engine: create-or-update with bounded polling.
//!
//! The engine never trusts local memory about a stack; it re-derives the
//! current status from the provider every time, so a run interrupted halfway
//! resumes correctly instead of assuming a clean slate.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::config::Prompt;
use crate::errors::{CrossgrantError, Result};
use crate::provider::{StackDescriptor, StackProvider, StackStatus, StackView, UpdateOutcome};
use crate::session::OnExisting;

/// Bounded-polling configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Base delay between describe calls in milliseconds.
    pub interval_ms: u64,
    /// Total budget before a wait times out, in milliseconds.
    pub max_wait_ms: u64,
    /// Randomize each delay between half the interval and the full interval.
    pub jitter: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_wait_ms: 1_800_000,
            jitter: true,
        }
    }
}

impl PollConfig {
    /// Creates the default poll config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Sets the total wait budget.
    #[must_use]
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    /// Disables jitter for deterministic delays.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn next_delay(&self) -> Duration {
        let millis = if self.jitter && self.interval_ms > 1 {
            rand::thread_rng().gen_range(self.interval_ms / 2..=self.interval_ms)
        } else {
            self.interval_ms
        };
        Duration::from_millis(millis)
    }
}

/// Explicit acknowledgement that a unit creating identity resources may be
/// deployed. The engine fails closed without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityAck(bool);

impl CapabilityAck {
    /// The caller has acknowledged the elevated capability.
    #[must_use]
    pub fn acknowledged() -> Self {
        Self(true)
    }

    /// No acknowledgement was given.
    #[must_use]
    pub fn withheld() -> Self {
        Self(false)
    }

    /// Whether the capability was acknowledged.
    #[must_use]
    pub fn is_acknowledged(self) -> bool {
        self.0
    }
}

/// A stack that reached a terminal state under the engine, with its outputs
/// snapshot.
#[derive(Debug, Clone)]
pub struct DeployedStack {
    /// The stack name.
    pub name: String,
    /// The terminal status reached.
    pub status: StackStatus,
    /// Outputs recorded at that state.
    pub outputs: BTreeMap<String, String>,
}

impl DeployedStack {
    /// Looks up a named output.
    ///
    /// Fails with [`CrossgrantError::NotFound`] when the stack's output set
    /// lacks the key, e.g. because the unit never declares it.
    pub fn output(&self, key: &str) -> Result<&str> {
        self.outputs
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CrossgrantError::not_found(format!("output '{key}' of stack '{}'", self.name)))
    }
}

/// Wait discipline for an operation.
///
/// Deploy waits are strict: without the producer's output the run cannot
/// safely continue. Teardown waits are best-effort: a timeout is logged and
/// suppressed so the remaining stacks still get processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// A wait timeout is fatal.
    Strict,
    /// A wait timeout is logged and returned as `None`.
    BestEffort,
}

/// Polls under an explicit [`WaitPolicy`].
///
/// Under [`WaitPolicy::BestEffort`] a timeout yields `Ok(None)` instead of
/// an error; every other failure still propagates.
pub async fn wait_with_policy(
    provider: &dyn StackProvider,
    name: &str,
    poll: &PollConfig,
    policy: WaitPolicy,
) -> Result<Option<StackView>> {
    match wait_for_terminal(provider, name, poll).await {
        Ok(view) => Ok(Some(view)),
        Err(err) if policy == WaitPolicy::BestEffort && err.is_wait_timeout() => {
            tracing::warn!(stack = name, error = %err, "timeout suppressed by best-effort policy");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Polls until the stack reaches a terminal status or the budget runs out.
pub async fn wait_for_terminal(
    provider: &dyn StackProvider,
    name: &str,
    poll: &PollConfig,
) -> Result<StackView> {
    let mut waited_ms: u64 = 0;
    loop {
        let view = provider.describe(name).await?;
        if view.status.is_terminal() {
            debug!(stack = name, status = %view.status, "terminal state reached");
            return Ok(view);
        }
        if waited_ms >= poll.max_wait_ms {
            return Err(CrossgrantError::WaitTimeout {
                stack: name.to_string(),
                waited_secs: waited_ms / 1000,
            });
        }
        let delay = poll.next_delay();
        debug!(
            stack = name,
            status = %view.status,
            waited_ms,
            delay_ms = delay.as_millis() as u64,
            "waiting for terminal state"
        );
        tokio::time::sleep(delay).await;
        waited_ms = waited_ms.saturating_add(delay.as_millis() as u64);
    }
}

/// Drives a single declarative unit through create-or-update to a terminal
/// state.
pub struct StackDeploymentEngine<'a> {
    provider: &'a dyn StackProvider,
    prompt: &'a dyn Prompt,
    poll: PollConfig,
}

impl<'a> StackDeploymentEngine<'a> {
    /// Creates an engine with the default poll config.
    #[must_use]
    pub fn new(provider: &'a dyn StackProvider, prompt: &'a dyn Prompt) -> Self {
        Self {
            provider,
            prompt,
            poll: PollConfig::default(),
        }
    }

    /// Overrides the poll config.
    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Creates or updates the stack and blocks until a terminal state.
    ///
    /// A unit with `requires_elevated_capability` must be deployed with
    /// [`CapabilityAck::acknowledged`]; otherwise the engine fails closed
    /// before any provider call.
    pub async fn deploy(
        &self,
        descriptor: &StackDescriptor,
        ack: CapabilityAck,
        on_existing: OnExisting,
    ) -> Result<DeployedStack> {
        if descriptor.requires_elevated_capability && !ack.is_acknowledged() {
            return Err(CrossgrantError::CapabilityNotAcknowledged {
                stack: descriptor.name.clone(),
            });
        }

        let mut view = self.provider.describe(&descriptor.name).await?;

        // An earlier cancelled run may have left an operation inflight.
        if !view.status.is_terminal() {
            info!(
                stack = %descriptor.name,
                status = %view.status,
                "operation already inflight, waiting for it to settle"
            );
            view = wait_for_terminal(self.provider, &descriptor.name, &self.poll).await?;
        }

        view = match view.status {
            StackStatus::Absent | StackStatus::DeleteComplete => {
                info!(stack = %descriptor.name, "creating stack");
                self.provider
                    .create(descriptor, ack.is_acknowledged())
                    .await?;
                wait_for_terminal(self.provider, &descriptor.name, &self.poll).await?
            }
            status if status.is_failed() => {
                return Err(Self::failure(&descriptor.name, &view));
            }
            _ => self.handle_existing(descriptor, ack, on_existing, view).await?,
        };

        if view.status.is_failed() {
            return Err(Self::failure(&descriptor.name, &view));
        }

        info!(stack = %descriptor.name, status = %view.status, "stack deployed");
        Ok(DeployedStack {
            name: descriptor.name.clone(),
            status: view.status,
            outputs: view.outputs,
        })
    }

    /// Extracts a named output from a deployed stack.
    pub fn get_output(&self, stack: &DeployedStack, key: &str) -> Result<String> {
        stack.output(key).map(ToString::to_string)
    }

    async fn handle_existing(
        &self,
        descriptor: &StackDescriptor,
        ack: CapabilityAck,
        on_existing: OnExisting,
        view: StackView,
    ) -> Result<StackView> {
        let update = match on_existing {
            OnExisting::Update => true,
            OnExisting::Skip => false,
            OnExisting::Prompt => self.prompt.confirm(&format!(
                "Stack '{}' already exists ({}). Update it?",
                descriptor.name, view.status
            ))?,
        };

        if !update {
            info!(stack = %descriptor.name, status = %view.status, "leaving existing stack untouched");
            return Ok(view);
        }

        match self
            .provider
            .update(descriptor, ack.is_acknowledged())
            .await?
        {
            UpdateOutcome::Applied => {
                info!(stack = %descriptor.name, "updating stack");
                wait_for_terminal(self.provider, &descriptor.name, &self.poll).await
            }
            UpdateOutcome::NoChanges => {
                info!(stack = %descriptor.name, "no difference to deploy");
                Ok(view)
            }
        }
    }

    fn failure(name: &str, view: &StackView) -> CrossgrantError {
        let reason = view
            .status_reason
            .clone()
            .unwrap_or_else(|| view.status.to_string());
        CrossgrantError::stack_failed(name, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStackProvider, ProviderCall, ScriptedPrompt};
    use pretty_assertions::assert_eq;

    fn fast_poll() -> PollConfig {
        PollConfig::new()
            .with_interval_ms(1)
            .with_max_wait_ms(50)
            .without_jitter()
    }

    fn descriptor() -> StackDescriptor {
        StackDescriptor::new("grant-producer", "template")
            .with_parameter("BucketName", "my-bucket")
            .elevated()
    }

    #[tokio::test]
    async fn creates_absent_stack_and_waits() {
        let provider = FakeStackProvider::new();
        provider.set_outputs(
            "grant-producer",
            [("RoleArn", "arn:aws:iam::222222222222:role/X")],
        );
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let deployed = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Prompt)
            .await
            .expect("deploy should succeed");

        assert_eq!(deployed.status, StackStatus::CreateComplete);
        assert_eq!(
            deployed.output("RoleArn").expect("output present"),
            "arn:aws:iam::222222222222:role/X"
        );
        assert!(provider
            .calls()
            .contains(&ProviderCall::Create("grant-producer".to_string())));
    }

    #[tokio::test]
    async fn fails_closed_without_capability_ack() {
        let provider = FakeStackProvider::new();
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let err = engine
            .deploy(&descriptor(), CapabilityAck::withheld(), OnExisting::Update)
            .await
            .expect_err("must fail closed");

        assert!(matches!(err, CrossgrantError::CapabilityNotAcknowledged { .. }));
        // Fail closed means zero provider calls.
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn existing_complete_stack_with_skip_is_untouched() {
        let provider = FakeStackProvider::new();
        provider.preload("grant-producer", StackStatus::CreateComplete);
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let deployed = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Skip)
            .await
            .expect("skip should succeed");

        assert_eq!(deployed.status, StackStatus::CreateComplete);
        let calls = provider.calls();
        assert!(!calls.contains(&ProviderCall::Update("grant-producer".to_string())));
        assert!(!calls.contains(&ProviderCall::Create("grant-producer".to_string())));
    }

    #[tokio::test]
    async fn no_changes_update_is_success() {
        let provider = FakeStackProvider::new();
        provider.preload("grant-producer", StackStatus::CreateComplete);
        provider.set_update_outcome(UpdateOutcome::NoChanges);
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let deployed = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Update)
            .await
            .expect("no-op update is success, not failure");

        assert_eq!(deployed.status, StackStatus::CreateComplete);
    }

    #[tokio::test]
    async fn prompt_policy_asks_before_updating() {
        let provider = FakeStackProvider::new();
        provider.preload("grant-producer", StackStatus::CreateComplete);
        let prompt = ScriptedPrompt::with_confirms(vec![false]);
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Prompt)
            .await
            .expect("declining the update is success");

        assert!(!provider
            .calls()
            .contains(&ProviderCall::Update("grant-producer".to_string())));
        // Exactly one question, and it names the stack in question.
        let questions = prompt.questions();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains("grant-producer"));
    }

    #[tokio::test]
    async fn inflight_operation_is_waited_out_then_reevaluated() {
        let provider = FakeStackProvider::new();
        provider.set_outputs(
            "grant-producer",
            [("RoleArn", "arn:aws:iam::222222222222:role/X")],
        );
        // A cancelled earlier run left a create inflight; it settles on its
        // own while this run is polling.
        provider.script_statuses(
            "grant-producer",
            [
                StackStatus::CreateInProgress,
                StackStatus::CreateInProgress,
                StackStatus::CreateComplete,
            ],
        );
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let deployed = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Skip)
            .await
            .expect("settled stack is reusable");

        assert_eq!(deployed.status, StackStatus::CreateComplete);
        assert_eq!(
            deployed.output("RoleArn").expect("output present"),
            "arn:aws:iam::222222222222:role/X"
        );
        // The inflight operation was adopted, not duplicated.
        let calls = provider.calls();
        assert!(!calls.contains(&ProviderCall::Create("grant-producer".to_string())));
        assert!(!calls.contains(&ProviderCall::Update("grant-producer".to_string())));
    }

    #[tokio::test]
    async fn rolled_back_update_is_a_stack_failure() {
        let provider = FakeStackProvider::new();
        provider.script_statuses(
            "grant-producer",
            [
                StackStatus::CreateComplete,
                StackStatus::UpdateRollbackInProgress,
                StackStatus::UpdateRollbackComplete,
            ],
        );
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let err = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Update)
            .await
            .expect_err("a rolled-back update is fatal");

        match err {
            CrossgrantError::StackOperationFailed { stack, reason } => {
                assert_eq!(stack, "grant-producer");
                assert!(reason.contains("UPDATE_ROLLBACK_COMPLETE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_create_surfaces_provider_reason() {
        let provider = FakeStackProvider::new();
        provider.fail_create("grant-producer", "Role with same name exists");
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());

        let err = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Update)
            .await
            .expect_err("create failure is fatal");

        match err {
            CrossgrantError::StackOperationFailed { stack, reason } => {
                assert_eq!(stack, "grant-producer");
                assert!(reason.contains("Role with same name exists"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn hanging_stack_times_out_within_budget() {
        let provider = FakeStackProvider::new();
        provider.hang("grant-producer");
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(
            PollConfig::new()
                .with_interval_ms(1)
                .with_max_wait_ms(5)
                .without_jitter(),
        );

        let err = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Update)
            .await
            .expect_err("hang must time out");
        assert!(err.is_wait_timeout());
    }

    #[tokio::test]
    async fn wait_policy_decides_whether_a_timeout_is_fatal() {
        let provider = FakeStackProvider::new();
        provider.hang("grant-producer");
        let poll = PollConfig::new()
            .with_interval_ms(1)
            .with_max_wait_ms(3)
            .without_jitter();

        let strict = wait_with_policy(&provider, "grant-producer", &poll, WaitPolicy::Strict).await;
        assert!(matches!(strict, Err(ref err) if err.is_wait_timeout()));

        let best_effort =
            wait_with_policy(&provider, "grant-producer", &poll, WaitPolicy::BestEffort).await;
        assert!(matches!(best_effort, Ok(None)));
    }

    #[tokio::test]
    async fn missing_output_is_not_found() {
        let provider = FakeStackProvider::new();
        provider.set_outputs(
            "grant-producer",
            [("RoleArn", "arn:aws:iam::222222222222:role/X")],
        );
        let prompt = ScriptedPrompt::default();
        let engine = StackDeploymentEngine::new(&provider, &prompt).with_poll_config(fast_poll());
        let deployed = engine
            .deploy(&descriptor(), CapabilityAck::acknowledged(), OnExisting::Update)
            .await
            .expect("deploy should succeed");

        assert_eq!(
            engine
                .get_output(&deployed, "RoleArn")
                .expect("declared output"),
            "arn:aws:iam::222222222222:role/X"
        );
        let err = engine
            .get_output(&deployed, "BucketPolicy")
            .expect_err("undeclared output");
        assert!(matches!(err, CrossgrantError::NotFound { .. }));
    }
}
