//! Immutable run configuration.
//!
//! A [`Session`] is created once per invocation, validated before any cloud
//! mutation, and threaded explicitly through every stage. No stage reads
//! anything that was not passed to it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CrossgrantError, Result};

/// Minimum assumable-session duration accepted by STS, in seconds.
pub const MIN_SESSION_DURATION_SECS: u32 = 900;

/// Maximum assumable-session duration accepted by STS, in seconds.
pub const MAX_SESSION_DURATION_SECS: u32 = 43_200;

/// The literal an operator must type before teardown issues any deletion.
pub const DEFAULT_CONFIRM_TOKEN: &str = "destroy";

/// Policy applied when a stack already exists in a complete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExisting {
    /// Apply an update unconditionally.
    Update,
    /// Leave the existing stack untouched.
    Skip,
    /// Ask the operator (the interactive default).
    Prompt,
}

impl Default for OnExisting {
    fn default() -> Self {
        Self::Prompt
    }
}

impl std::fmt::Display for OnExisting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Skip => write!(f, "skip"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

impl std::str::FromStr for OnExisting {
    type Err = CrossgrantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "skip" => Ok(Self::Skip),
            "prompt" | "" => Ok(Self::Prompt),
            other => Err(CrossgrantError::validation(format!(
                "unknown on-existing policy '{other}' (expected update, skip, or prompt)"
            ))),
        }
    }
}

/// Immutable configuration for one deploy or teardown invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Profile of the account that will assume the role.
    pub profile_consumer: String,
    /// Profile of the account that owns the bucket and the role.
    pub profile_producer: String,
    /// The bucket the role grants access to.
    pub bucket_name: String,
    /// Prefix for the role created by the producer stack.
    pub role_name_prefix: String,
    /// Shared secret included in the assume-role call.
    pub external_id: String,
    /// Maximum duration of an assumed session, in seconds.
    pub max_session_duration_secs: u32,
    /// Deterministic prefix both stack names are derived from.
    pub stack_name_prefix: String,
    /// Policy when a stack already exists.
    #[serde(default)]
    pub on_existing: OnExisting,
    /// Literal the operator must type before any deletion.
    pub confirm_token: String,
}

impl Session {
    /// Starts building a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Name of the producer (role-owning) stack.
    #[must_use]
    pub fn producer_stack_name(&self) -> String {
        derive_producer_stack_name(&self.stack_name_prefix)
    }

    /// Name of the consumer (role-assuming) stack.
    #[must_use]
    pub fn consumer_stack_name(&self) -> String {
        derive_consumer_stack_name(&self.stack_name_prefix)
    }

    /// File name of the generated verification script.
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        derive_artifact_file_name(&self.stack_name_prefix)
    }

    /// Every local file a deployment may generate, in the given directory.
    #[must_use]
    pub fn local_artifacts(&self, dir: &Path) -> Vec<PathBuf> {
        derive_local_artifacts(&self.stack_name_prefix, dir)
    }

    /// File name of the transient consumer parameter payload.
    #[must_use]
    pub fn parameter_file_name(&self) -> String {
        derive_parameter_file_name(&self.stack_name_prefix)
    }

    /// Checks the session invariants. Fails fast, before any cloud mutation.
    pub fn validate(&self) -> Result<()> {
        Self::non_empty("consumer profile", &self.profile_consumer)?;
        Self::non_empty("producer profile", &self.profile_producer)?;
        Self::non_empty("bucket name", &self.bucket_name)?;
        Self::non_empty("role name prefix", &self.role_name_prefix)?;
        Self::non_empty("external ID", &self.external_id)?;
        Self::non_empty("stack name prefix", &self.stack_name_prefix)?;
        Self::non_empty("confirm token", &self.confirm_token)?;

        if self.profile_consumer == self.profile_producer {
            return Err(CrossgrantError::validation(format!(
                "consumer and producer must use different profiles, both are '{}'",
                self.profile_consumer
            )));
        }

        if !(MIN_SESSION_DURATION_SECS..=MAX_SESSION_DURATION_SECS)
            .contains(&self.max_session_duration_secs)
        {
            return Err(CrossgrantError::validation(format!(
                "session duration {}s is outside {MIN_SESSION_DURATION_SECS}..={MAX_SESSION_DURATION_SECS}",
                self.max_session_duration_secs
            )));
        }

        Ok(())
    }

    fn non_empty(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(CrossgrantError::validation(format!("{field} must not be empty")));
        }
        Ok(())
    }
}

fn derive_producer_stack_name(prefix: &str) -> String {
    format!("{prefix}-producer")
}

fn derive_consumer_stack_name(prefix: &str) -> String {
    format!("{prefix}-consumer")
}

fn derive_artifact_file_name(prefix: &str) -> String {
    format!("{prefix}-verify.sh")
}

fn derive_parameter_file_name(prefix: &str) -> String {
    format!("{prefix}-consumer-params.json")
}

fn derive_local_artifacts(prefix: &str, dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join(derive_artifact_file_name(prefix)),
        dir.join(derive_parameter_file_name(prefix)),
    ]
}

/// The subset of a session teardown actually consumes: which stacks to
/// delete, which local artifacts to remove and the confirmation literal.
/// Collecting one asks none of the deploy-only questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownScope {
    /// Profile of the account hosting the consumer stack.
    pub profile_consumer: String,
    /// Profile of the account hosting the producer stack.
    pub profile_producer: String,
    /// Deterministic prefix both stack names are derived from.
    pub stack_name_prefix: String,
    /// Literal the operator must type before any deletion.
    pub confirm_token: String,
}

impl TeardownScope {
    /// Creates a scope with the default confirmation token.
    #[must_use]
    pub fn new(
        profile_consumer: impl Into<String>,
        profile_producer: impl Into<String>,
        stack_name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            profile_consumer: profile_consumer.into(),
            profile_producer: profile_producer.into(),
            stack_name_prefix: stack_name_prefix.into(),
            confirm_token: DEFAULT_CONFIRM_TOKEN.to_string(),
        }
    }

    /// Name of the producer (role-owning) stack.
    #[must_use]
    pub fn producer_stack_name(&self) -> String {
        derive_producer_stack_name(&self.stack_name_prefix)
    }

    /// Name of the consumer (role-assuming) stack.
    #[must_use]
    pub fn consumer_stack_name(&self) -> String {
        derive_consumer_stack_name(&self.stack_name_prefix)
    }

    /// File name of the generated verification script.
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        derive_artifact_file_name(&self.stack_name_prefix)
    }

    /// Every local file a deployment may have generated, in the given
    /// directory.
    ///
    /// Teardown removes these; the transient parameter file is normally
    /// already gone because it is deleted as soon as the provider call that
    /// consumed it returns.
    #[must_use]
    pub fn local_artifacts(&self, dir: &Path) -> Vec<PathBuf> {
        derive_local_artifacts(&self.stack_name_prefix, dir)
    }
}

impl From<&Session> for TeardownScope {
    fn from(session: &Session) -> Self {
        Self {
            profile_consumer: session.profile_consumer.clone(),
            profile_producer: session.profile_producer.clone(),
            stack_name_prefix: session.stack_name_prefix.clone(),
            confirm_token: session.confirm_token.clone(),
        }
    }
}

/// Builder for [`Session`], with sensible interactive defaults.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    profile_consumer: String,
    profile_producer: String,
    bucket_name: String,
    role_name_prefix: String,
    external_id: String,
    max_session_duration_secs: u32,
    stack_name_prefix: String,
    on_existing: OnExisting,
    confirm_token: String,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            profile_consumer: String::new(),
            profile_producer: String::new(),
            bucket_name: String::new(),
            role_name_prefix: "CrossAccountAccess".to_string(),
            external_id: String::new(),
            max_session_duration_secs: 3600,
            stack_name_prefix: "crossgrant".to_string(),
            on_existing: OnExisting::Prompt,
            confirm_token: DEFAULT_CONFIRM_TOKEN.to_string(),
        }
    }
}

impl SessionBuilder {
    /// Sets the consumer profile.
    #[must_use]
    pub fn profile_consumer(mut self, value: impl Into<String>) -> Self {
        self.profile_consumer = value.into();
        self
    }

    /// Sets the producer profile.
    #[must_use]
    pub fn profile_producer(mut self, value: impl Into<String>) -> Self {
        self.profile_producer = value.into();
        self
    }

    /// Sets the bucket name.
    #[must_use]
    pub fn bucket_name(mut self, value: impl Into<String>) -> Self {
        self.bucket_name = value.into();
        self
    }

    /// Sets the role name prefix.
    #[must_use]
    pub fn role_name_prefix(mut self, value: impl Into<String>) -> Self {
        self.role_name_prefix = value.into();
        self
    }

    /// Sets the external ID.
    #[must_use]
    pub fn external_id(mut self, value: impl Into<String>) -> Self {
        self.external_id = value.into();
        self
    }

    /// Sets the maximum session duration in seconds.
    #[must_use]
    pub fn max_session_duration_secs(mut self, value: u32) -> Self {
        self.max_session_duration_secs = value;
        self
    }

    /// Sets the stack name prefix.
    #[must_use]
    pub fn stack_name_prefix(mut self, value: impl Into<String>) -> Self {
        self.stack_name_prefix = value.into();
        self
    }

    /// Sets the policy for existing stacks.
    #[must_use]
    pub fn on_existing(mut self, value: OnExisting) -> Self {
        self.on_existing = value;
        self
    }

    /// Sets the teardown confirmation token.
    #[must_use]
    pub fn confirm_token(mut self, value: impl Into<String>) -> Self {
        self.confirm_token = value.into();
        self
    }

    /// Validates the invariants and produces the immutable session.
    pub fn build(self) -> Result<Session> {
        let session = Session {
            profile_consumer: self.profile_consumer,
            profile_producer: self.profile_producer,
            bucket_name: self.bucket_name,
            role_name_prefix: self.role_name_prefix,
            external_id: self.external_id,
            max_session_duration_secs: self.max_session_duration_secs,
            stack_name_prefix: self.stack_name_prefix,
            on_existing: self.on_existing,
            confirm_token: self.confirm_token,
        };
        session.validate()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> SessionBuilder {
        Session::builder()
            .profile_consumer("Development")
            .profile_producer("Production")
            .bucket_name("my-bucket")
            .external_id("E")
    }

    #[test]
    fn builds_with_defaults() {
        let session = valid_builder().build().expect("session should build");
        assert_eq!(session.max_session_duration_secs, 3600);
        assert_eq!(session.on_existing, OnExisting::Prompt);
        assert_eq!(session.confirm_token, DEFAULT_CONFIRM_TOKEN);
    }

    #[test]
    fn stack_names_derive_deterministically() {
        let session = valid_builder()
            .stack_name_prefix("team-a")
            .build()
            .expect("session should build");
        assert_eq!(session.producer_stack_name(), "team-a-producer");
        assert_eq!(session.consumer_stack_name(), "team-a-consumer");
        assert_eq!(session.artifact_file_name(), "team-a-verify.sh");
    }

    #[test]
    fn teardown_scope_derives_the_same_names_as_the_session() {
        let session = valid_builder()
            .stack_name_prefix("team-a")
            .build()
            .expect("session should build");
        let scope = TeardownScope::from(&session);
        assert_eq!(scope.producer_stack_name(), session.producer_stack_name());
        assert_eq!(scope.consumer_stack_name(), session.consumer_stack_name());
        assert_eq!(scope.artifact_file_name(), session.artifact_file_name());
        assert_eq!(scope.confirm_token, session.confirm_token);

        let scope = TeardownScope::new("Development", "Production", "grant");
        assert_eq!(scope.producer_stack_name(), "grant-producer");
        assert_eq!(scope.confirm_token, DEFAULT_CONFIRM_TOKEN);
    }

    #[test]
    fn rejects_empty_bucket() {
        let err = valid_builder().bucket_name("  ").build();
        assert!(matches!(err, Err(CrossgrantError::Validation { .. })));
    }

    #[test]
    fn rejects_empty_external_id() {
        let err = valid_builder().external_id("").build();
        assert!(matches!(err, Err(CrossgrantError::Validation { .. })));
    }

    #[test]
    fn rejects_identical_profiles() {
        let err = valid_builder().profile_producer("Development").build();
        assert!(matches!(err, Err(CrossgrantError::Validation { .. })));
    }

    #[test]
    fn rejects_out_of_range_duration() {
        assert!(valid_builder().max_session_duration_secs(899).build().is_err());
        assert!(valid_builder().max_session_duration_secs(43_201).build().is_err());
        assert!(valid_builder().max_session_duration_secs(900).build().is_ok());
    }

    #[test]
    fn on_existing_parses() {
        assert_eq!("update".parse::<OnExisting>().ok(), Some(OnExisting::Update));
        assert_eq!("Skip".parse::<OnExisting>().ok(), Some(OnExisting::Skip));
        assert_eq!("".parse::<OnExisting>().ok(), Some(OnExisting::Prompt));
        assert!("yolo".parse::<OnExisting>().is_err());
    }
}
