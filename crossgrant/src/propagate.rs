//! Output propagation: binding a producer output into consumer parameters.

use serde::{Deserialize, Serialize};

use crate::deploy::DeployedStack;
use crate::errors::{CrossgrantError, Result};

/// One output value read from a stack that reached a complete state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBinding {
    /// The output key.
    pub key: String,
    /// The output value.
    pub value: String,
    /// The stack the value came from.
    pub source_stack: String,
}

impl OutputBinding {
    /// Reads a named output from a deployed stack.
    pub fn from_stack(stack: &DeployedStack, key: &str) -> Result<Self> {
        let value = stack.output(key)?.to_string();
        Ok(Self {
            key: key.to_string(),
            value,
            source_stack: stack.name.clone(),
        })
    }
}

/// Pure transform: turns a binding into one `(key, value)` parameter entry
/// for the dependent stack.
///
/// A producer stack that completed but exposes no usable value is a hard
/// deployment defect, surfaced as [`CrossgrantError::EmptyOutput`].
pub fn bind(binding: &OutputBinding, target_parameter_key: &str) -> Result<(String, String)> {
    if binding.value.trim().is_empty() {
        return Err(CrossgrantError::EmptyOutput {
            stack: binding.source_stack.clone(),
            key: binding.key.clone(),
        });
    }
    Ok((target_parameter_key.to_string(), binding.value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StackStatus;
    use std::collections::BTreeMap;

    fn producer_with_output(value: &str) -> DeployedStack {
        let mut outputs = BTreeMap::new();
        outputs.insert("RoleArn".to_string(), value.to_string());
        DeployedStack {
            name: "grant-producer".to_string(),
            status: StackStatus::CreateComplete,
            outputs,
        }
    }

    #[test]
    fn binds_into_target_parameter() {
        let stack = producer_with_output("arn:aws:iam::222222222222:role/X");
        let binding = OutputBinding::from_stack(&stack, "RoleArn").expect("output present");
        let (key, value) = bind(&binding, "ProducerRoleArn").expect("non-empty binds");
        assert_eq!(key, "ProducerRoleArn");
        assert_eq!(value, "arn:aws:iam::222222222222:role/X");
    }

    #[test]
    fn empty_output_is_a_deployment_defect() {
        let stack = producer_with_output("  ");
        let binding = OutputBinding::from_stack(&stack, "RoleArn").expect("output present");
        let err = bind(&binding, "ProducerRoleArn").expect_err("empty value must fail");
        assert!(matches!(
            err,
            CrossgrantError::EmptyOutput { ref key, .. } if key == "RoleArn"
        ));
    }

    #[test]
    fn missing_output_fails_at_read_time() {
        let stack = producer_with_output("arn");
        assert!(OutputBinding::from_stack(&stack, "BucketArn").is_err());
    }
}
