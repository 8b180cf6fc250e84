//! Declarative-unit provider contract.
//!
//! The orchestration core depends only on this surface: describe a stack,
//! create it, update it, delete it. The resource graphs inside the templates
//! are external collaborators.

mod cfn;

pub use cfn::CfnStackProvider;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// The lifecycle status of a stack, as reported by the provider.
///
/// `Absent` is our own marker for a stack the provider has no record of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    /// The provider has no record of the stack.
    Absent,
    /// Create is underway.
    CreateInProgress,
    /// Create reached a successful terminal state.
    CreateComplete,
    /// Create failed terminally.
    CreateFailed,
    /// A failed create is being rolled back.
    RollbackInProgress,
    /// A failed create finished rolling back. The stack is unusable until
    /// deleted, so this counts as a failed terminal state.
    RollbackComplete,
    /// Rolling back a failed create itself failed.
    RollbackFailed,
    /// Update is underway.
    UpdateInProgress,
    /// Update succeeded and old resources are being cleaned up. Still
    /// in progress: outputs may not reflect the new template yet.
    UpdateCompleteCleanupInProgress,
    /// Update reached a successful terminal state.
    UpdateComplete,
    /// Update failed terminally.
    UpdateFailed,
    /// A failed update is being rolled back.
    UpdateRollbackInProgress,
    /// A rolled-back update is cleaning up resources of the failed attempt.
    #[serde(rename = "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS")]
    UpdateRollbackCleanupInProgress,
    /// A failed update finished rolling back. The previous template is in
    /// effect but the requested one was not applied, so this counts as a
    /// failed terminal state.
    UpdateRollbackComplete,
    /// Rolling back a failed update itself failed.
    UpdateRollbackFailed,
    /// Delete is underway.
    DeleteInProgress,
    /// Delete reached a successful terminal state.
    DeleteComplete,
    /// Delete failed terminally.
    DeleteFailed,
}

impl StackStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATE_IN_PROGRESS" => Some(Self::CreateInProgress),
            "CREATE_COMPLETE" => Some(Self::CreateComplete),
            "CREATE_FAILED" => Some(Self::CreateFailed),
            "ROLLBACK_IN_PROGRESS" => Some(Self::RollbackInProgress),
            "ROLLBACK_COMPLETE" => Some(Self::RollbackComplete),
            "ROLLBACK_FAILED" => Some(Self::RollbackFailed),
            "UPDATE_IN_PROGRESS" => Some(Self::UpdateInProgress),
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Some(Self::UpdateCompleteCleanupInProgress)
            }
            "UPDATE_COMPLETE" => Some(Self::UpdateComplete),
            "UPDATE_FAILED" => Some(Self::UpdateFailed),
            "UPDATE_ROLLBACK_IN_PROGRESS" => Some(Self::UpdateRollbackInProgress),
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Some(Self::UpdateRollbackCleanupInProgress)
            }
            "UPDATE_ROLLBACK_COMPLETE" => Some(Self::UpdateRollbackComplete),
            "UPDATE_ROLLBACK_FAILED" => Some(Self::UpdateRollbackFailed),
            "DELETE_IN_PROGRESS" => Some(Self::DeleteInProgress),
            "DELETE_COMPLETE" => Some(Self::DeleteComplete),
            "DELETE_FAILED" => Some(Self::DeleteFailed),
            _ => None,
        }
    }

    /// Returns true if no further automatic transition will occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::CreateInProgress
                | Self::RollbackInProgress
                | Self::UpdateInProgress
                | Self::UpdateCompleteCleanupInProgress
                | Self::UpdateRollbackInProgress
                | Self::UpdateRollbackCleanupInProgress
                | Self::DeleteInProgress
        )
    }

    /// Returns true for a successful terminal state.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::UpdateComplete | Self::DeleteComplete
        )
    }

    /// Returns true for a failed terminal state.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed
                | Self::RollbackComplete
                | Self::RollbackFailed
                | Self::UpdateFailed
                | Self::UpdateRollbackComplete
                | Self::UpdateRollbackFailed
                | Self::DeleteFailed
        )
    }
}

// Display writes the provider's own spelling so error reports read like the
// console does.
impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "ABSENT",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
        };
        write!(f, "{text}")
    }
}

/// A declarative unit: name, template, parameter set, capability flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// The stack name.
    pub name: String,
    /// The template body.
    pub template_body: String,
    /// Parameter name to value.
    pub parameters: BTreeMap<String, String>,
    /// True when the template creates identity or permission resources and
    /// the caller must acknowledge the elevated capability.
    pub requires_elevated_capability: bool,
}

impl StackDescriptor {
    /// Creates a descriptor with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, template_body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_body: template_body.into(),
            parameters: BTreeMap::new(),
            requires_elevated_capability: false,
        }
    }

    /// Adds one parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Marks the unit as creating identity resources.
    #[must_use]
    pub fn elevated(mut self) -> Self {
        self.requires_elevated_capability = true;
        self
    }
}

/// A point-in-time view of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackView {
    /// Current status.
    pub status: StackStatus,
    /// The provider's detail text for a failed status, when available.
    pub status_reason: Option<String>,
    /// Declared outputs. Empty until a `*_COMPLETE` state.
    pub outputs: BTreeMap<String, String>,
}

impl StackView {
    /// View of a stack the provider has no record of.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            status: StackStatus::Absent,
            status_reason: None,
            outputs: BTreeMap::new(),
        }
    }
}

/// Result of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOutcome {
    /// The provider accepted the update and is applying it.
    #[default]
    Applied,
    /// The provider found no difference to deploy. This is success, not
    /// failure: an unchanged parameter set must be idempotent.
    NoChanges,
}

/// Operations the orchestration core needs from the declarative-unit
/// provider.
#[async_trait]
pub trait StackProvider: Send + Sync {
    /// Describes the stack, returning an [`StackView::absent`] view when the
    /// provider has no record of it.
    async fn describe(&self, name: &str) -> Result<StackView>;

    /// Issues a create. `capability_ack` is forwarded to the provider for
    /// units that declare identity resources.
    async fn create(&self, descriptor: &StackDescriptor, capability_ack: bool) -> Result<()>;

    /// Issues an update.
    async fn update(
        &self,
        descriptor: &StackDescriptor,
        capability_ack: bool,
    ) -> Result<UpdateOutcome>;

    /// Issues a delete.
    async fn delete(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_round_trips_provider_spelling() {
        for text in [
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
            "CREATE_FAILED",
            "ROLLBACK_COMPLETE",
            "ROLLBACK_FAILED",
            "UPDATE_COMPLETE",
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE",
            "UPDATE_ROLLBACK_FAILED",
            "DELETE_FAILED",
        ] {
            let status = StackStatus::parse(text).expect("known status");
            assert_eq!(status.to_string(), text);
        }
        assert!(StackStatus::parse("REVIEW_IN_PROGRESS").is_none());
    }

    #[test]
    fn terminal_classification() {
        assert!(StackStatus::CreateComplete.is_terminal());
        assert!(StackStatus::DeleteComplete.is_terminal());
        assert!(StackStatus::Absent.is_terminal());
        assert!(StackStatus::RollbackComplete.is_terminal());
        assert!(!StackStatus::CreateInProgress.is_terminal());
        assert!(!StackStatus::DeleteInProgress.is_terminal());
        assert!(!StackStatus::UpdateCompleteCleanupInProgress.is_terminal());
        assert!(!StackStatus::UpdateRollbackInProgress.is_terminal());
        assert!(!StackStatus::UpdateRollbackCleanupInProgress.is_terminal());
    }

    #[test]
    fn rollback_complete_counts_as_failed() {
        assert!(StackStatus::RollbackComplete.is_failed());
        assert!(!StackStatus::RollbackComplete.is_complete());
    }

    #[test]
    fn rolled_back_update_counts_as_failed() {
        assert!(StackStatus::UpdateRollbackComplete.is_terminal());
        assert!(StackStatus::UpdateRollbackComplete.is_failed());
        assert!(!StackStatus::UpdateRollbackComplete.is_complete());
        assert!(StackStatus::UpdateRollbackFailed.is_failed());
        assert!(StackStatus::RollbackFailed.is_failed());
    }

    #[test]
    fn descriptor_builder_orders_parameters() {
        let descriptor = StackDescriptor::new("s", "body")
            .with_parameter("Zeta", "1")
            .with_parameter("Alpha", "2")
            .elevated();
        let keys: Vec<_> = descriptor.parameters.keys().collect();
        assert_eq!(keys, vec!["Alpha", "Zeta"]);
        assert!(descriptor.requires_elevated_capability);
    }

    #[test]
    fn status_serializes_in_provider_spelling() {
        let json = serde_json::to_string(&StackStatus::CreateComplete).expect("serializes");
        assert_eq!(json, r#""CREATE_COMPLETE""#);
        let json = serde_json::to_string(&StackStatus::UpdateRollbackCleanupInProgress)
            .expect("serializes");
        assert_eq!(json, r#""UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS""#);
    }
}
