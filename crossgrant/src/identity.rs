//! Account identity resolution and the distinct-account guardrail.

use aws_config::BehaviorVersion;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::errors::{CrossgrantError, Result};

/// A resolved account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps an account ID string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only identity query behind a profile.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// The profile this resolver queries for.
    fn profile(&self) -> &str;

    /// Resolves the account behind the profile.
    ///
    /// Fails with [`CrossgrantError::IdentityResolution`] when the profile is
    /// unauthenticated or unreachable; the caller should advise
    /// re-authentication rather than retry automatically.
    async fn who_am_i(&self) -> Result<AccountId>;
}

/// [`IdentityResolver`] backed by STS `GetCallerIdentity`.
#[derive(Debug, Clone)]
pub struct StsIdentityResolver {
    profile: String,
    client: StsClient,
}

impl StsIdentityResolver {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(profile: impl Into<String>, client: StsClient) -> Self {
        Self {
            profile: profile.into(),
            client,
        }
    }

    /// Builds a client from a named profile's credential chain.
    pub async fn from_profile(profile: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .load()
            .await;
        Self::new(profile, StsClient::new(&shared))
    }
}

#[async_trait]
impl IdentityResolver for StsIdentityResolver {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn who_am_i(&self) -> Result<AccountId> {
        let out = self.client.get_caller_identity().send().await.map_err(|err| {
            CrossgrantError::identity(&self.profile, format!("{}", DisplayErrorContext(&err)))
        })?;
        let account = out.account().ok_or_else(|| {
            CrossgrantError::identity(&self.profile, "GetCallerIdentity returned no account")
        })?;
        Ok(AccountId::new(account))
    }
}

/// Fails with [`CrossgrantError::SameAccount`] when both profiles resolve to
/// one account.
pub fn assert_distinct(a: &AccountId, b: &AccountId) -> Result<()> {
    if a == b {
        return Err(CrossgrantError::SameAccount {
            account_id: a.to_string(),
        });
    }
    Ok(())
}

/// The two verified account identities for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIdentities {
    /// Account behind the consumer profile.
    pub consumer: AccountId,
    /// Account behind the producer profile.
    pub producer: AccountId,
}

/// Resolves both profiles and enforces that they belong to distinct
/// accounts.
pub async fn resolve_identities(
    consumer: &dyn IdentityResolver,
    producer: &dyn IdentityResolver,
) -> Result<ResolvedIdentities> {
    let consumer_id = consumer.who_am_i().await?;
    let producer_id = producer.who_am_i().await?;
    assert_distinct(&consumer_id, &producer_id)?;
    info!(
        consumer_profile = consumer.profile(),
        consumer_account = %consumer_id,
        producer_profile = producer.profile(),
        producer_account = %producer_id,
        "verified distinct accounts"
    );
    Ok(ResolvedIdentities {
        consumer: consumer_id,
        producer: producer_id,
    })
}
