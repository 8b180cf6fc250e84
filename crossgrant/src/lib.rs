//! # Crossgrant
//!
//! Crossgrant provisions a trust relationship between two isolated AWS
//! accounts so that a principal in a *consumer* account can assume a role in
//! a *producer* account and operate on one S3 bucket there.
//!
//! The heart of the crate is the deployment orchestrator, which:
//!
//! - **Validates the session**: immutable run configuration, checked before
//!   any cloud mutation
//! - **Verifies identities**: both profiles must resolve to distinct accounts
//! - **Sequences two dependent stacks**: the producer stack's `RoleArn`
//!   output becomes an input parameter of the consumer stack, so the order
//!   is fixed and never relaxed
//! - **Generates a verification script**: a self-contained shell artifact
//!   bound to the deployed role ARN, external ID, bucket and profile
//!
//! Teardown runs independently, deleting the stacks in reverse dependency
//! order with a best-effort wait policy and removing generated local files.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crossgrant::prelude::*;
//!
//! let session = collect_session(&StdinPrompt)?;
//! let orchestrator = DeploymentOrchestrator::new(
//!     &session,
//!     Providers { producer: &producer_cfn, consumer: &consumer_cfn },
//!     Resolvers { producer: &producer_sts, consumer: &consumer_sts },
//!     &StdinPrompt,
//! );
//! let result = orchestrator.run().await?;
//! println!("role: {}", result.role_arn);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod identity;
pub mod orchestrator;
pub mod propagate;
pub mod provider;
pub mod session;
pub mod teardown;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{render, write_executable, BindingSet};
    pub use crate::config::{collect_session, collect_teardown_scope, Prompt, StdinPrompt};
    pub use crate::deploy::{
        CapabilityAck, DeployedStack, PollConfig, StackDeploymentEngine, WaitPolicy,
    };
    pub use crate::errors::{CrossgrantError, Result};
    pub use crate::identity::{
        assert_distinct, AccountId, IdentityResolver, ResolvedIdentities,
        StsIdentityResolver,
    };
    pub use crate::orchestrator::{
        DeploymentOrchestrator, DeploymentResult, Providers, Resolvers,
    };
    pub use crate::propagate::{bind, OutputBinding};
    pub use crate::provider::{
        CfnStackProvider, StackDescriptor, StackProvider, StackStatus,
        StackView, UpdateOutcome,
    };
    pub use crate::session::{OnExisting, Session, SessionBuilder, TeardownScope};
    pub use crate::teardown::{TeardownEngine, TeardownOutcome, TeardownReport};
}
