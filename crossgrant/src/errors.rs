//! Error types for crossgrant operations.
//!
//! One taxonomy enum covers every failure the orchestrator, the deployment
//! engine and the teardown engine can surface. Each variant carries enough
//! context to tell the operator which stage failed and what the provider
//! reported.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CrossgrantError>;

/// The main error type for crossgrant operations.
#[derive(Debug, Error)]
pub enum CrossgrantError {
    /// A session field is missing or malformed. Raised before any cloud
    /// mutation.
    #[error("invalid session: {message}")]
    Validation {
        /// What was wrong with the session.
        message: String,
    },

    /// The identity behind a profile could not be resolved.
    #[error("could not resolve the identity of profile '{profile}': {reason} (re-authenticate the profile and run again)")]
    IdentityResolution {
        /// The profile that failed to resolve.
        profile: String,
        /// The provider's failure detail.
        reason: String,
    },

    /// Both profiles resolve to the same account. Cross-account access is
    /// meaningless within one boundary.
    #[error("both profiles resolve to account {account_id}; pick profiles from two distinct accounts")]
    SameAccount {
        /// The shared account ID.
        account_id: String,
    },

    /// A stack declaring identity resources was deployed without the
    /// capability being acknowledged. Fails closed.
    #[error("stack '{stack}' creates identity resources but the capability was not acknowledged")]
    CapabilityNotAcknowledged {
        /// The stack whose deployment was refused.
        stack: String,
    },

    /// The provider reported a failed create or update.
    #[error("stack '{stack}' operation failed: {reason}")]
    StackOperationFailed {
        /// The stack that failed.
        stack: String,
        /// The provider's failure detail.
        reason: String,
    },

    /// A terminal status was not reached within the polling bound.
    #[error("timed out after {waited_secs}s waiting for stack '{stack}' to reach a terminal state")]
    WaitTimeout {
        /// The stack being waited on.
        stack: String,
        /// Seconds spent waiting before giving up.
        waited_secs: u64,
    },

    /// An expected stack or output was missing.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing thing.
        what: String,
    },

    /// A producer stack completed but exposed an empty output value.
    #[error("stack '{stack}' completed but output '{key}' is empty")]
    EmptyOutput {
        /// The stack the output came from.
        stack: String,
        /// The output key.
        key: String,
    },

    /// Placeholders remained after substituting a complete binding set.
    /// Signals an internal inconsistency and should be unreachable.
    #[error("unresolved placeholders after substitution: {}", placeholders.join(", "))]
    UnresolvedPlaceholder {
        /// The placeholder names that were left behind.
        placeholders: Vec<String>,
    },

    /// A transport or serialization failure from the cloud provider.
    #[error("provider error: {message}")]
    Provider {
        /// The provider's failure detail.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrossgrantError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an identity-resolution error.
    #[must_use]
    pub fn identity(profile: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IdentityResolution {
            profile: profile.into(),
            reason: reason.into(),
        }
    }

    /// Creates a stack-operation failure carrying the provider's reason.
    #[must_use]
    pub fn stack_failed(stack: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StackOperationFailed {
            stack: stack.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a provider transport error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Returns true if the error is fatal under the deploy policy.
    ///
    /// Every variant is fatal during deployment; the distinction matters to
    /// the teardown engine, which suppresses wait timeouts by policy.
    #[must_use]
    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_failure_names_stack_and_reason() {
        let err = CrossgrantError::stack_failed("grant-producer", "ROLLBACK_COMPLETE");
        let text = err.to_string();
        assert!(text.contains("grant-producer"));
        assert!(text.contains("ROLLBACK_COMPLETE"));
    }

    #[test]
    fn identity_error_advises_reauthentication() {
        let err = CrossgrantError::identity("Production", "token expired");
        assert!(err.to_string().contains("re-authenticate"));
    }

    #[test]
    fn unresolved_placeholders_are_listed() {
        let err = CrossgrantError::UnresolvedPlaceholder {
            placeholders: vec!["role_arn".to_string(), "bucket_name".to_string()],
        };
        assert!(err.to_string().contains("role_arn, bucket_name"));
    }

    #[test]
    fn wait_timeout_is_distinguishable() {
        let err = CrossgrantError::WaitTimeout {
            stack: "grant-consumer".to_string(),
            waited_secs: 1800,
        };
        assert!(err.is_wait_timeout());
        assert!(!CrossgrantError::validation("x").is_wait_timeout());
    }
}
