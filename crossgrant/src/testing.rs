//! Recording fakes for tests.
//!
//! An in-memory [`FakeStackProvider`] that records every provider call in
//! order, a fixed-identity resolver and a scripted prompt. These carry the
//! unit and integration test load; nothing here talks to the network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Prompt;
use crate::errors::Result;
use crate::identity::{AccountId, IdentityResolver};
use crate::provider::{StackDescriptor, StackProvider, StackStatus, StackView, UpdateOutcome};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `describe(name)`.
    Describe(String),
    /// `create(name)`.
    Create(String),
    /// `update(name)`.
    Update(String),
    /// `delete(name)`.
    Delete(String),
}

#[derive(Debug, Clone)]
struct FakeStackState {
    status: StackStatus,
    status_reason: Option<String>,
    outputs: BTreeMap<String, String>,
}

/// In-memory stack provider with instant state transitions.
///
/// Create converges straight to `CREATE_COMPLETE` (or a scripted failure),
/// update per the configured [`UpdateOutcome`], delete to `DELETE_COMPLETE`
/// unless the stack was marked hanging. A scripted status sequence, when
/// present, overrides all of that: each describe consumes the next status
/// and the last consumed one sticks.
#[derive(Default)]
pub struct FakeStackProvider {
    calls: Mutex<Vec<ProviderCall>>,
    stacks: Mutex<HashMap<String, FakeStackState>>,
    outputs: Mutex<HashMap<String, BTreeMap<String, String>>>,
    update_outcome: Mutex<UpdateOutcome>,
    create_failures: Mutex<HashMap<String, String>>,
    hanging: Mutex<Vec<String>>,
    sequences: Mutex<HashMap<String, VecDeque<StackStatus>>>,
}

impl FakeStackProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Index of the first matching call, for ordering assertions.
    #[must_use]
    pub fn position_of(&self, call: &ProviderCall) -> Option<usize> {
        self.calls.lock().iter().position(|recorded| recorded == call)
    }

    /// Seeds an already-existing stack.
    pub fn preload(&self, name: &str, status: StackStatus) {
        let outputs = self.outputs.lock().get(name).cloned().unwrap_or_default();
        self.stacks.lock().insert(
            name.to_string(),
            FakeStackState {
                status,
                status_reason: None,
                outputs,
            },
        );
    }

    /// Configures the outputs a stack exposes once complete.
    pub fn set_outputs<'a>(
        &self,
        name: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        let map: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.outputs.lock().insert(name.to_string(), map.clone());
        if let Some(state) = self.stacks.lock().get_mut(name) {
            state.outputs = map;
        }
    }

    /// Configures the outcome every update reports.
    pub fn set_update_outcome(&self, outcome: UpdateOutcome) {
        *self.update_outcome.lock() = outcome;
    }

    /// Makes `create(name)` converge to `CREATE_FAILED` with the reason.
    pub fn fail_create(&self, name: &str, reason: &str) {
        self.create_failures
            .lock()
            .insert(name.to_string(), reason.to_string());
    }

    /// Scripts the statuses successive describes report, in order. The last
    /// consumed status persists once the sequence runs dry.
    pub fn script_statuses(
        &self,
        name: &str,
        statuses: impl IntoIterator<Item = StackStatus>,
    ) {
        self.sequences
            .lock()
            .insert(name.to_string(), statuses.into_iter().collect());
    }

    /// Makes the stack report an in-progress status forever.
    pub fn hang(&self, name: &str) {
        self.hanging.lock().push(name.to_string());
        self.stacks.lock().insert(
            name.to_string(),
            FakeStackState {
                status: StackStatus::CreateInProgress,
                status_reason: None,
                outputs: BTreeMap::new(),
            },
        );
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().push(call);
    }

    fn is_hanging(&self, name: &str) -> bool {
        self.hanging.lock().iter().any(|hung| hung == name)
    }

    fn next_scripted_status(&self, name: &str) -> Option<StackStatus> {
        self.sequences
            .lock()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl StackProvider for FakeStackProvider {
    async fn describe(&self, name: &str) -> Result<StackView> {
        self.record(ProviderCall::Describe(name.to_string()));
        if let Some(status) = self.next_scripted_status(name) {
            let outputs = if status.is_complete() {
                self.outputs.lock().get(name).cloned().unwrap_or_default()
            } else {
                BTreeMap::new()
            };
            self.stacks.lock().insert(
                name.to_string(),
                FakeStackState {
                    status,
                    status_reason: None,
                    outputs: outputs.clone(),
                },
            );
            return Ok(StackView {
                status,
                status_reason: None,
                outputs,
            });
        }
        let stacks = self.stacks.lock();
        Ok(stacks.get(name).map_or_else(StackView::absent, |state| StackView {
            status: state.status,
            status_reason: state.status_reason.clone(),
            outputs: state.outputs.clone(),
        }))
    }

    async fn create(&self, descriptor: &StackDescriptor, _capability_ack: bool) -> Result<()> {
        self.record(ProviderCall::Create(descriptor.name.clone()));
        if self.is_hanging(&descriptor.name) {
            return Ok(());
        }
        let state = if let Some(reason) = self.create_failures.lock().get(&descriptor.name) {
            FakeStackState {
                status: StackStatus::CreateFailed,
                status_reason: Some(reason.clone()),
                outputs: BTreeMap::new(),
            }
        } else {
            FakeStackState {
                status: StackStatus::CreateComplete,
                status_reason: None,
                outputs: self
                    .outputs
                    .lock()
                    .get(&descriptor.name)
                    .cloned()
                    .unwrap_or_default(),
            }
        };
        self.stacks.lock().insert(descriptor.name.clone(), state);
        Ok(())
    }

    async fn update(
        &self,
        descriptor: &StackDescriptor,
        _capability_ack: bool,
    ) -> Result<UpdateOutcome> {
        self.record(ProviderCall::Update(descriptor.name.clone()));
        let outcome = *self.update_outcome.lock();
        if outcome == UpdateOutcome::Applied {
            let outputs = self
                .outputs
                .lock()
                .get(&descriptor.name)
                .cloned()
                .unwrap_or_default();
            self.stacks.lock().insert(
                descriptor.name.clone(),
                FakeStackState {
                    status: StackStatus::UpdateComplete,
                    status_reason: None,
                    outputs,
                },
            );
        }
        Ok(outcome)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record(ProviderCall::Delete(name.to_string()));
        if self.is_hanging(name) {
            if let Some(state) = self.stacks.lock().get_mut(name) {
                state.status = StackStatus::DeleteInProgress;
            }
            return Ok(());
        }
        self.stacks.lock().insert(
            name.to_string(),
            FakeStackState {
                status: StackStatus::DeleteComplete,
                status_reason: None,
                outputs: BTreeMap::new(),
            },
        );
        Ok(())
    }
}

/// An identity resolver returning one fixed account.
#[derive(Debug, Clone)]
pub struct FakeIdentityResolver {
    profile: String,
    account: AccountId,
}

impl FakeIdentityResolver {
    /// Creates a resolver for the profile/account pair.
    #[must_use]
    pub fn new(profile: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            account: AccountId::new(account),
        }
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentityResolver {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn who_am_i(&self) -> Result<AccountId> {
        Ok(self.account.clone())
    }
}

/// A prompt answering from canned scripts.
///
/// When a script runs dry, `ask` falls back to the question's default and
/// `confirm` answers yes, so tests only script the answers they care about.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    confirms: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// Scripts the `ask` answers, in order. An empty string takes the
    /// question's default, like pressing enter.
    #[must_use]
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            confirms: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the `confirm` answers, in order.
    #[must_use]
    pub fn with_confirms(confirms: Vec<bool>) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            confirms: Mutex::new(confirms.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every question asked so far.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, question: &str, default: &str) -> io::Result<String> {
        self.asked.lock().push(question.to_string());
        let answer = self.answers.lock().pop_front().unwrap_or_default();
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    fn confirm(&self, question: &str) -> io::Result<bool> {
        self.asked.lock().push(question.to_string());
        Ok(self.confirms.lock().pop_front().unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_provider_records_calls_in_order() {
        let provider = FakeStackProvider::new();
        let descriptor = StackDescriptor::new("a", "body");
        provider.describe("a").await.expect("describe");
        provider.create(&descriptor, true).await.expect("create");
        provider.delete("a").await.expect("delete");

        assert_eq!(
            provider.calls(),
            vec![
                ProviderCall::Describe("a".to_string()),
                ProviderCall::Create("a".to_string()),
                ProviderCall::Delete("a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn create_converges_to_complete_with_outputs() {
        let provider = FakeStackProvider::new();
        provider.set_outputs("a", [("RoleArn", "arn")]);
        let descriptor = StackDescriptor::new("a", "body");
        provider.create(&descriptor, true).await.expect("create");
        let view = provider.describe("a").await.expect("describe");
        assert_eq!(view.status, StackStatus::CreateComplete);
        assert_eq!(view.outputs.get("RoleArn").map(String::as_str), Some("arn"));
    }

    #[tokio::test]
    async fn scripted_status_sequence_sticks_at_its_last_entry() {
        let provider = FakeStackProvider::new();
        provider.set_outputs("a", [("RoleArn", "arn")]);
        provider.script_statuses(
            "a",
            [StackStatus::CreateInProgress, StackStatus::CreateComplete],
        );

        let first = provider.describe("a").await.expect("describe");
        assert_eq!(first.status, StackStatus::CreateInProgress);
        assert!(first.outputs.is_empty());

        let second = provider.describe("a").await.expect("describe");
        assert_eq!(second.status, StackStatus::CreateComplete);
        assert_eq!(second.outputs.get("RoleArn").map(String::as_str), Some("arn"));

        // Sequence is exhausted; the last status persists.
        let third = provider.describe("a").await.expect("describe");
        assert_eq!(third.status, StackStatus::CreateComplete);
    }

    #[test]
    fn scripted_prompt_falls_back_to_defaults() {
        let prompt = ScriptedPrompt::with_answers(vec!["typed"]);
        assert_eq!(prompt.ask("q1", "d1").expect("ask"), "typed");
        assert_eq!(prompt.ask("q2", "d2").expect("ask"), "d2");
        assert!(prompt.confirm("sure?").expect("confirm"));
    }
}
