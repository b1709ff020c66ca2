//! Provider-facing ports.
//!
//! The coordinator never talks to an identity provider directly. Each
//! provider integration implements [`IdentityBackend`], normalizing its
//! SDK or wire protocol behind a small async surface with a shared failure
//! vocabulary: a refresh either fails permanently (the grant is dead, only
//! interactive sign-in can recover) or transiently (safe to retry later).

use crate::types::{Account, AccountId, ProviderKind, TokenRecord};
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

/// Failure modes of an interactive sign-in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignInError {
    /// The user dismissed the flow before completing it.
    #[error("Sign-in was cancelled by the user")]
    Cancelled,

    /// The flow ran and failed.
    #[error("Sign-in failed: {0}")]
    Failed(String),
}

/// Failure modes of a token refresh, shared across providers.
///
/// Every backend maps its provider-specific errors onto this union. The
/// distinction drives the coordinator's recovery behavior: a permanent
/// denial wipes credentials and demands a new sign-in, a transient failure
/// leaves everything in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The provider rejected the grant itself: invalid, expired, or revoked
    /// refresh credentials, or consent newly required.
    #[error("Provider permanently denied the refresh: {reason}")]
    PermanentDenial { reason: String },

    /// Anything else: network failure, timeout, provider 5xx. The stored
    /// credentials may still be good.
    #[error("Refresh failed transiently: {cause}")]
    Transient { cause: String },
}

/// Port to a single identity provider.
///
/// One implementation is registered per [`ProviderKind`]. Implementations
/// own their UI and SDK plumbing; the coordinator only sees these four
/// operations.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// The provider this backend serves.
    fn provider(&self) -> ProviderKind;

    /// Run the interactive sign-in flow and return the signed-in account
    /// with its initial credentials.
    ///
    /// Blocks (asynchronously) for as long as the user takes; the
    /// coordinator applies no timeout here.
    async fn sign_in_interactive(
        &self,
        scopes: &BTreeSet<String>,
    ) -> Result<(Account, TokenRecord), SignInError>;

    /// Exchange the refresh handle for a fresh token record.
    ///
    /// The returned record's `refresh_handle` may be empty when the
    /// provider did not rotate it; the coordinator keeps the previous
    /// handle in that case.
    async fn refresh(
        &self,
        refresh_handle: &str,
        scopes: &BTreeSet<String>,
    ) -> Result<TokenRecord, RefreshError>;

    /// Best-effort revocation of the grant at the provider.
    ///
    /// Returns whether the provider acknowledged the revocation. Sign-out
    /// proceeds regardless of the outcome.
    async fn revoke(&self, refresh_handle: &str) -> bool;
}

/// Host-side account bookkeeping consumed by the coordinator.
///
/// When a refresh is permanently denied the coordinator flags the account
/// so the host UI can surface a re-authentication prompt. The call is
/// idempotent and fire-and-forget from the coordinator's point of view.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Flag the account as requiring a new interactive sign-in.
    async fn mark_account_for_reauthentication(
        &self,
        account_id: &AccountId,
        provider: ProviderKind,
    );
}
