//! CloudFormation implementation of the provider contract.

use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_cloudformation::Client;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{CrossgrantError, Result};

use super::{StackDescriptor, StackProvider, StackStatus, StackView, UpdateOutcome};

/// [`StackProvider`] backed by the CloudFormation API, one client per
/// profile.
#[derive(Debug, Clone)]
pub struct CfnStackProvider {
    client: Client,
}

impl CfnStackProvider {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from a named profile's credential chain.
    pub async fn from_profile(profile: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .load()
            .await;
        Self::new(Client::new(&shared))
    }

    fn parameters(descriptor: &StackDescriptor) -> Vec<Parameter> {
        descriptor
            .parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect()
    }

    fn capabilities(capability_ack: bool) -> Option<Vec<Capability>> {
        capability_ack.then(|| vec![Capability::CapabilityNamedIam])
    }
}

#[async_trait]
impl StackProvider for CfnStackProvider {
    async fn describe(&self, name: &str) -> Result<StackView> {
        let response = match self.client.describe_stacks().stack_name(name).send().await {
            Ok(response) => response,
            Err(err) => {
                let message = format!("{}", DisplayErrorContext(&err));
                // DescribeStacks reports a missing stack as a validation
                // error, not an empty list.
                if message.contains("does not exist") {
                    debug!(stack = name, "stack not present");
                    return Ok(StackView::absent());
                }
                return Err(CrossgrantError::provider(message));
            }
        };

        let Some(stack) = response.stacks().first() else {
            return Ok(StackView::absent());
        };

        let status_text = stack
            .stack_status()
            .map(aws_sdk_cloudformation::types::StackStatus::as_str)
            .unwrap_or_default();
        let status = StackStatus::parse(status_text).ok_or_else(|| {
            CrossgrantError::provider(format!(
                "stack '{name}' reported unrecognized status '{status_text}'"
            ))
        })?;

        let outputs: BTreeMap<String, String> = stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_string(),
                    output.output_value()?.to_string(),
                ))
            })
            .collect();

        Ok(StackView {
            status,
            status_reason: stack.stack_status_reason().map(ToString::to_string),
            outputs,
        })
    }

    async fn create(&self, descriptor: &StackDescriptor, capability_ack: bool) -> Result<()> {
        self.client
            .create_stack()
            .stack_name(&descriptor.name)
            .template_body(&descriptor.template_body)
            .set_parameters(Some(Self::parameters(descriptor)))
            .set_capabilities(Self::capabilities(capability_ack))
            .send()
            .await
            .map_err(|err| CrossgrantError::provider(format!("{}", DisplayErrorContext(&err))))?;
        debug!(stack = %descriptor.name, "create issued");
        Ok(())
    }

    async fn update(
        &self,
        descriptor: &StackDescriptor,
        capability_ack: bool,
    ) -> Result<UpdateOutcome> {
        let result = self
            .client
            .update_stack()
            .stack_name(&descriptor.name)
            .template_body(&descriptor.template_body)
            .set_parameters(Some(Self::parameters(descriptor)))
            .set_capabilities(Self::capabilities(capability_ack))
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(stack = %descriptor.name, "update issued");
                Ok(UpdateOutcome::Applied)
            }
            Err(err) => {
                let message = format!("{}", DisplayErrorContext(&err));
                if message.contains("No updates are to be performed") {
                    debug!(stack = %descriptor.name, "no difference to deploy");
                    return Ok(UpdateOutcome::NoChanges);
                }
                Err(CrossgrantError::provider(message))
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|err| CrossgrantError::provider(format!("{}", DisplayErrorContext(&err))))?;
        debug!(stack = name, "delete issued");
        Ok(())
    }
}
