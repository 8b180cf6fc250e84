//! Deployment orchestration.
//!
//! Sequences the two dependent stacks. The order is mandatory and never
//! relaxed: the consumer stack's parameter set is only fully known after the
//! producer's `RoleArn` output has been read, so no two stack mutations are
//! ever issued concurrently.


use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::artifact::{self, BindingSet};
use crate::config::Prompt;
use crate::deploy::{CapabilityAck, DeployedStack, PollConfig, StackDeploymentEngine};
use crate::errors::Result;
use crate::identity::{resolve_identities, AccountId, IdentityResolver, ResolvedIdentities};
use crate::propagate::{bind, OutputBinding};
use crate::provider::{StackDescriptor, StackProvider};
use crate::session::Session;

const PRODUCER_TEMPLATE: &str = include_str!("../../templates/producer.yaml");
const CONSUMER_TEMPLATE: &str = include_str!("../../templates/consumer.yaml");

/// The producer output consumed by the consumer stack.
pub const ROLE_ARN_OUTPUT: &str = "RoleArn";

/// The consumer parameter the role ARN is bound into.
pub const ROLE_ARN_PARAMETER: &str = "ProducerRoleArn";

/// One stack provider per account boundary.
pub struct Providers<'a> {
    /// Provider operating under the producer profile.
    pub producer: &'a dyn StackProvider,
    /// Provider operating under the consumer profile.
    pub consumer: &'a dyn StackProvider,
}

/// One identity resolver per account boundary.
pub struct Resolvers<'a> {
    /// Resolver for the producer profile.
    pub producer: &'a dyn IdentityResolver,
    /// Resolver for the consumer profile.
    pub consumer: &'a dyn IdentityResolver,
}

/// Everything a successful deployment produced.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// The verified account identities.
    pub identities: ResolvedIdentities,
    /// The producer stack at its terminal state.
    pub producer: DeployedStack,
    /// The consumer stack at its terminal state.
    pub consumer: DeployedStack,
    /// The role ARN propagated between them.
    pub role_arn: String,
    /// Where the verification script was written.
    pub artifact_path: PathBuf,
}

/// Composition root: validate, verify, deploy producer, propagate, deploy
/// consumer, generate the verification artifact.
pub struct DeploymentOrchestrator<'a> {
    session: &'a Session,
    providers: Providers<'a>,
    resolvers: Resolvers<'a>,
    prompt: &'a dyn Prompt,
    poll: PollConfig,
    artifact_dir: PathBuf,
}

impl<'a> DeploymentOrchestrator<'a> {
    /// Creates an orchestrator writing artifacts into the current directory.
    #[must_use]
    pub fn new(
        session: &'a Session,
        providers: Providers<'a>,
        resolvers: Resolvers<'a>,
        prompt: &'a dyn Prompt,
    ) -> Self {
        Self {
            session,
            providers,
            resolvers,
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

    /// Overrides where local artifacts are written.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Runs the whole deployment in its fixed order.
    pub async fn run(&self) -> Result<DeploymentResult> {
        self.session.validate()?;
        info!(stage = "validate", "session invariants hold");

        let identities =
            resolve_identities(self.resolvers.consumer, self.resolvers.producer).await?;

        let producer_descriptor = producer_descriptor(self.session, &identities.consumer);
        let producer_engine =
            StackDeploymentEngine::new(self.providers.producer, self.prompt)
                .with_poll_config(self.poll.clone());
        let producer = producer_engine
            .deploy(
                &producer_descriptor,
                CapabilityAck::acknowledged(),
                self.session.on_existing,
            )
            .await?;
        info!(stage = "producer", stack = %producer.name, status = %producer.status, "producer stack settled");

        let role_binding = OutputBinding::from_stack(&producer, ROLE_ARN_OUTPUT)?;
        let role_parameter = bind(&role_binding, ROLE_ARN_PARAMETER)?;
        info!(stage = "propagate", role_arn = %role_binding.value, "producer output bound");

        let consumer_descriptor = consumer_descriptor(self.session, role_parameter);
        let consumer = self
            .deploy_consumer(&consumer_descriptor)
            .await?;
        info!(stage = "consumer", stack = %consumer.name, status = %consumer.status, "consumer stack settled");

        let bindings = BindingSet::new(
            role_binding.value.clone(),
            &self.session.external_id,
            &self.session.bucket_name,
            &self.session.profile_consumer,
            self.session.max_session_duration_secs,
        );
        let script = artifact::render(artifact::SCRIPT_TEMPLATE, &bindings)?;
        let artifact_path = self.artifact_dir.join(self.session.artifact_file_name());
        artifact::write_executable(&artifact_path, &script)?;
        info!(stage = "artifact", path = %artifact_path.display(), "verification script generated");

        Ok(DeploymentResult {
            identities,
            producer,
            consumer,
            role_arn: role_binding.value,
            artifact_path,
        })
    }

    /// Deploys the consumer stack, persisting its parameter payload for the
    /// duration of the provider call only.
    async fn deploy_consumer(&self, descriptor: &StackDescriptor) -> Result<DeployedStack> {
        let parameter_path = self.artifact_dir.join(self.session.parameter_file_name());
        write_parameter_payload(&parameter_path, descriptor)?;

        let engine = StackDeploymentEngine::new(self.providers.consumer, self.prompt)
            .with_poll_config(self.poll.clone());
        let outcome = engine
            .deploy(descriptor, CapabilityAck::acknowledged(), self.session.on_existing)
            .await;

        // Transient: gone as soon as the provider call that consumed it is
        // over, whether it succeeded or not.
        let _ = fs::remove_file(&parameter_path);
        outcome
    }
}

#[derive(Serialize)]
struct ParameterPayload<'a> {
    stack_name: &'a str,
    parameters: &'a std::collections::BTreeMap<String, String>,
}

fn write_parameter_payload(path: &Path, descriptor: &StackDescriptor) -> Result<()> {
    let payload = ParameterPayload {
        stack_name: &descriptor.name,
        parameters: &descriptor.parameters,
    };
    let text = serde_json::to_string_pretty(&payload)
        .map_err(|err| crate::errors::CrossgrantError::provider(err.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

/// Builds the producer stack descriptor from the session and the verified
/// consumer account.
#[must_use]
pub fn producer_descriptor(session: &Session, trusted_account: &AccountId) -> StackDescriptor {
    StackDescriptor::new(session.producer_stack_name(), PRODUCER_TEMPLATE)
        .with_parameter("TrustedAccountId", trusted_account.as_str())
        .with_parameter("RoleNamePrefix", &session.role_name_prefix)
        .with_parameter("ExternalId", &session.external_id)
        .with_parameter(
            "MaxSessionDuration",
            session.max_session_duration_secs.to_string(),
        )
        .with_parameter("BucketName", &session.bucket_name)
        .elevated()
}

/// Builds the consumer stack descriptor around the propagated role ARN.
#[must_use]
pub fn consumer_descriptor(
    session: &Session,
    role_parameter: (String, String),
) -> StackDescriptor {
    let (key, value) = role_parameter;
    StackDescriptor::new(session.consumer_stack_name(), CONSUMER_TEMPLATE)
        .with_parameter(key, value)
        .with_parameter("BucketName", &session.bucket_name)
        .elevated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn session() -> Session {
        Session::builder()
            .profile_consumer("Development")
            .profile_producer("Production")
            .bucket_name("my-bucket")
            .role_name_prefix("X")
            .external_id("E")
            .stack_name_prefix("grant")
            .build()
            .expect("valid session")
    }

    #[test]
    fn producer_descriptor_carries_session_values() {
        let descriptor = producer_descriptor(&session(), &AccountId::new("111111111111"));
        assert_eq!(descriptor.name, "grant-producer");
        assert!(descriptor.requires_elevated_capability);
        assert_eq!(
            descriptor.parameters.get("TrustedAccountId").map(String::as_str),
            Some("111111111111")
        );
        assert_eq!(
            descriptor.parameters.get("ExternalId").map(String::as_str),
            Some("E")
        );
        assert_eq!(
            descriptor.parameters.get("MaxSessionDuration").map(String::as_str),
            Some("3600")
        );
    }

    #[test]
    fn consumer_descriptor_embeds_propagated_arn() {
        let descriptor = consumer_descriptor(
            &session(),
            (
                ROLE_ARN_PARAMETER.to_string(),
                "arn:aws:iam::222222222222:role/X".to_string(),
            ),
        );
        assert_eq!(descriptor.name, "grant-consumer");
        assert_eq!(
            descriptor.parameters.get(ROLE_ARN_PARAMETER).map(String::as_str),
            Some("arn:aws:iam::222222222222:role/X")
        );
    }
}
