//! Token Coordinator
//!
//! The coordinator is the single entry point for obtaining bearer tokens.
//! It resolves which account to serve, answers from the encrypted store
//! when the cached token is still fresh, and otherwise refreshes through
//! the provider's [`IdentityBackend`] with at most one refresh in flight
//! per account.
//!
//! ## Concurrency
//!
//! Refreshes are serialized per account through a lazily-created
//! `tokio::sync::Mutex`; unrelated accounts refresh in parallel. The
//! refresh itself runs in a detached task and callers await its handle,
//! so a caller abandoning its wait never cancels a refresh another caller
//! depends on — the result is persisted for whoever asks next.
//!
//! ## Failure handling
//!
//! A refresh the provider rejects permanently (revoked or expired grant,
//! consent newly required) wipes the stored credentials, flags the account
//! for re-authentication, and publishes [`AuthEvent::ReauthRequired`].
//! Transient failures (network, timeout, provider 5xx) leave the stored
//! record untouched so a later call can retry.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{ProviderKind, TokenCoordinator};
//!
//! let coordinator = TokenCoordinator::new(&config, backends, accounts, event_bus);
//!
//! // Serve a token for the active Google account, refreshing if stale
//! let token = coordinator.get_bearer_token(ProviderKind::Google, None).await?;
//! ```

use crate::backend::{AccountRepository, IdentityBackend, RefreshError, SignInError};
use crate::error::{AuthError, Result};
use crate::registry::ActiveAccountRegistry;
use crate::store::EncryptedTokenStore;
use crate::types::{AccountId, ProviderKind};
use bridge_traits::Clock;
use core_runtime::{AuthEvent, CoreConfig, EventBus};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Coordinates the credential lifecycle for all configured providers.
///
/// Cheap to clone; clones share the same store, registry, and locks.
#[derive(Clone)]
pub struct TokenCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: EncryptedTokenStore,
    registry: ActiveAccountRegistry,
    backends: HashMap<ProviderKind, Arc<dyn IdentityBackend>>,
    accounts: Arc<dyn AccountRepository>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    safety_margin: chrono::Duration,
    refresh_timeout: Duration,
    // Per-account refresh serialization; entries are created lazily and
    // kept for the life of the coordinator
    refresh_locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl TokenCoordinator {
    /// Create a coordinator over the configured capabilities.
    ///
    /// One backend may be registered per provider; a later backend for the
    /// same provider replaces the earlier one.
    pub fn new(
        config: &CoreConfig,
        backends: Vec<Arc<dyn IdentityBackend>>,
        accounts: Arc<dyn AccountRepository>,
        events: EventBus,
    ) -> Self {
        let store = EncryptedTokenStore::new(
            config.key_value_store.clone(),
            config.token_cipher.clone(),
        );
        let registry = ActiveAccountRegistry::new(config.key_value_store.clone());
        let backends: HashMap<ProviderKind, Arc<dyn IdentityBackend>> = backends
            .into_iter()
            .map(|backend| (backend.provider(), backend))
            .collect();

        debug!(
            backends = backends.len(),
            "Initializing TokenCoordinator"
        );

        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                backends,
                accounts,
                events,
                clock: config.clock.clone(),
                safety_margin: config.safety_margin,
                refresh_timeout: config.refresh_timeout,
                refresh_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The active account registry backing this coordinator.
    pub fn registry(&self) -> &ActiveAccountRegistry {
        &self.inner.registry
    }

    /// Get a valid bearer token for an account, refreshing if necessary.
    ///
    /// With `account_id` of `None` the provider's active account is used.
    /// A fresh cached token is returned without any locking; a stale one
    /// triggers a refresh serialized per account, so concurrent callers
    /// produce a single backend call.
    ///
    /// # Errors
    ///
    /// - `NoActiveAccount` - no account id supplied and none active
    /// - `AccountNotFound` - no credentials stored for the account
    /// - `NeedsReauthentication` - the grant is dead; sign in again
    /// - `TransientError` - the refresh failed but is safe to retry
    #[instrument(skip(self), fields(provider = %provider.as_str()))]
    pub async fn get_bearer_token(
        &self,
        provider: ProviderKind,
        account_id: Option<AccountId>,
    ) -> Result<String> {
        let id = self.resolve_account(provider, account_id).await?;

        match self.inner.store.get(&id).await {
            Ok(Some(record)) => {
                if record.is_fresh(self.inner.clock.now(), self.inner.safety_margin) {
                    debug!(account_id = %id, "Serving cached access token");
                    return Ok(record.access_token);
                }
                info!(account_id = %id, "Access token stale, refreshing");
            }
            Ok(None) => {
                warn!(account_id = %id, "No credentials stored for account");
                return Err(AuthError::AccountNotFound(id));
            }
            Err(AuthError::DecryptionFailed { .. }) => {
                // The slow path re-reads under the lock and recovers there
                warn!(account_id = %id, "Stored credentials unreadable");
            }
            Err(e) => return Err(e),
        }

        self.run_refresh(provider, id, None).await
    }

    /// Refresh an account's token even if the cached one is still fresh.
    ///
    /// Used when an API call was rejected with a freshly-served token.
    /// Concurrent forced refreshes still collapse into a single backend
    /// call: whichever caller loses the race returns the token its sibling
    /// just obtained.
    #[instrument(skip(self), fields(provider = %provider.as_str()))]
    pub async fn refresh_bearer_token(
        &self,
        provider: ProviderKind,
        account_id: Option<AccountId>,
    ) -> Result<String> {
        let id = self.resolve_account(provider, account_id).await?;

        let seen = match self.inner.store.get(&id).await {
            Ok(Some(record)) => record.access_token,
            Ok(None) => {
                warn!(account_id = %id, "No credentials stored for account");
                return Err(AuthError::AccountNotFound(id));
            }
            // Recovered under the lock in the slow path
            Err(AuthError::DecryptionFailed { .. }) => String::new(),
            Err(e) => return Err(e),
        };

        info!(account_id = %id, "Forced refresh requested");
        self.run_refresh(provider, id, Some(seen)).await
    }

    /// Run the interactive sign-in flow for a provider.
    ///
    /// On success the account and its credentials are persisted, the
    /// account becomes the provider's active account, and `AuthSuccess`
    /// is published. No timeout is applied; the user takes as long as the
    /// user takes.
    #[instrument(skip(self, scopes), fields(provider = %provider.as_str()))]
    pub async fn sign_in(
        &self,
        provider: ProviderKind,
        scopes: BTreeSet<String>,
    ) -> Result<AccountId> {
        let backend = self.inner.backend(provider)?;

        info!("Starting interactive sign-in");
        let (account, record) = match backend.sign_in_interactive(&scopes).await {
            Ok(pair) => pair,
            Err(SignInError::Cancelled) => {
                info!("Sign-in cancelled by the user");
                return Err(AuthError::SignInCancelled);
            }
            Err(SignInError::Failed(reason)) => {
                warn!(reason = %reason, "Sign-in failed");
                return Err(AuthError::SignInFailed(reason));
            }
        };

        if account.provider != provider {
            warn!(
                returned = %account.provider.as_str(),
                "Backend returned an account for the wrong provider"
            );
            return Err(AuthError::SignInFailed(format!(
                "backend returned an account for {}",
                account.provider.as_str()
            )));
        }

        let mut record = record;
        record.account_id = account.id.clone();

        self.inner.store.put(&account, &record).await?;
        self.inner
            .registry
            .set_active(provider, Some(account.id.clone()))
            .await?;
        self.inner.emit_auth_success(&account.id, provider);

        info!(account_id = %account.id, "Sign-in completed");
        Ok(account.id)
    }

    /// Sign an account out: revoke the grant (best effort), erase the
    /// stored row, and clear the provider's active slot if this account
    /// held it. Idempotent.
    #[instrument(skip(self), fields(account_id = %account_id, provider = %provider.as_str()))]
    pub async fn sign_out(&self, account_id: &AccountId, provider: ProviderKind) -> Result<()> {
        info!("Signing out account");

        // Revocation is advisory; local erasure proceeds regardless
        if let Ok(Some(record)) = self.inner.store.get(account_id).await {
            if !record.refresh_handle.is_empty() {
                if let Ok(backend) = self.inner.backend(provider) {
                    let acknowledged = backend.revoke(&record.refresh_handle).await;
                    debug!(acknowledged, "Provider revocation attempted");
                }
            }
        }

        self.inner.store.clear(account_id, true).await?;

        if self.inner.registry.get_active(provider).await?.as_ref() == Some(account_id) {
            self.inner.registry.set_active(provider, None).await?;
        }

        info!("Sign-out completed");
        Ok(())
    }

    /// Enumerate the persisted accounts for a provider.
    pub async fn list_accounts(&self, provider: ProviderKind) -> Result<Vec<crate::types::Account>> {
        self.inner.store.list_accounts(provider).await
    }

    async fn resolve_account(
        &self,
        provider: ProviderKind,
        account_id: Option<AccountId>,
    ) -> Result<AccountId> {
        if let Some(id) = account_id {
            return Ok(id);
        }

        self.inner
            .registry
            .get_active(provider)
            .await?
            .ok_or(AuthError::NoActiveAccount { provider })
    }

    /// Spawn the refresh as a detached task and await its result.
    ///
    /// The spawn boundary is what makes abandoned waits harmless: dropping
    /// the caller's future drops only the `JoinHandle`, the refresh runs
    /// to completion and persists its result.
    async fn run_refresh(
        &self,
        provider: ProviderKind,
        account_id: AccountId,
        seen_token: Option<String>,
    ) -> Result<String> {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            Inner::refresh_serialized(inner, provider, account_id, seen_token).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Refresh task failed to complete");
                Err(AuthError::TransientError {
                    cause: format!("refresh task failed: {}", e),
                })
            }
        }
    }
}

impl Inner {
    fn backend(&self, provider: ProviderKind) -> Result<&Arc<dyn IdentityBackend>> {
        self.backends
            .get(&provider)
            .ok_or(AuthError::ProviderNotConfigured { provider })
    }

    async fn refresh_lock_for(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The refresh critical section. Runs detached; holds the per-account
    /// lock for its whole duration.
    ///
    /// `seen_token` distinguishes the two entry points: `None` means the
    /// caller only needs a fresh token (double-check by freshness), `Some`
    /// means the caller explicitly rejected that token (double-check by
    /// comparing against what a sibling may have stored meanwhile).
    async fn refresh_serialized(
        inner: Arc<Inner>,
        provider: ProviderKind,
        account_id: AccountId,
        seen_token: Option<String>,
    ) -> Result<String> {
        let lock = inner.refresh_lock_for(&account_id).await;
        let _guard = lock.lock().await;

        // Re-read inside the lock: the previous holder may have refreshed,
        // wiped, or signed out this account
        let record = match inner.store.get(&account_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(account_id = %account_id, "Credentials disappeared before refresh");
                return Err(AuthError::AccountNotFound(account_id));
            }
            Err(AuthError::DecryptionFailed { .. }) => {
                warn!(account_id = %account_id, "Stored credentials unreadable, recovering");
                return inner.require_reauthentication(provider, account_id).await;
            }
            Err(e) => return Err(e),
        };

        let already_refreshed = match &seen_token {
            Some(seen) => !record.access_token.is_empty() && record.access_token != *seen,
            None => record.is_fresh(inner.clock.now(), inner.safety_margin),
        };
        if already_refreshed {
            debug!(account_id = %account_id, "Another caller already refreshed");
            return Ok(record.access_token);
        }

        if record.refresh_handle.is_empty() {
            warn!(account_id = %account_id, "No refresh handle stored, recovering");
            return inner.require_reauthentication(provider, account_id).await;
        }

        let backend = inner.backend(provider)?;

        info!(account_id = %account_id, "Refreshing access token");
        let refreshed = match timeout(
            inner.refresh_timeout,
            backend.refresh(&record.refresh_handle, &record.scopes),
        )
        .await
        {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(RefreshError::PermanentDenial { reason })) => {
                warn!(
                    account_id = %account_id,
                    reason = %reason,
                    "Provider permanently denied the refresh"
                );
                return inner.require_reauthentication(provider, account_id).await;
            }
            Ok(Err(RefreshError::Transient { cause })) => {
                warn!(
                    account_id = %account_id,
                    cause = %cause,
                    "Refresh failed transiently, stored record untouched"
                );
                return Err(AuthError::TransientError { cause });
            }
            Err(_) => {
                warn!(
                    account_id = %account_id,
                    timeout_secs = inner.refresh_timeout.as_secs(),
                    "Refresh timed out"
                );
                return Err(AuthError::TransientError {
                    cause: format!(
                        "refresh timed out after {}s",
                        inner.refresh_timeout.as_secs()
                    ),
                });
            }
        };

        let mut new_record = refreshed;
        new_record.account_id = account_id.clone();
        // An empty handle means the provider did not rotate it
        if new_record.refresh_handle.is_empty() {
            new_record.refresh_handle = record.refresh_handle;
        }

        let account = inner
            .store
            .get_account(&account_id)
            .await?
            .ok_or_else(|| AuthError::AccountNotFound(account_id.clone()))?;
        inner.store.put(&account, &new_record).await?;

        inner.emit_auth_success(&account_id, provider);
        info!(
            account_id = %account_id,
            has_expiry = new_record.expires_at.is_some(),
            "Access token refreshed"
        );

        Ok(new_record.access_token)
    }

    /// Local recovery for a dead grant or unreadable credentials: wipe the
    /// secrets (the profile survives), flag the account, publish
    /// `ReauthRequired`. Always returns `NeedsReauthentication`.
    async fn require_reauthentication(
        &self,
        provider: ProviderKind,
        account_id: AccountId,
    ) -> Result<String> {
        self.store.clear(&account_id, false).await?;
        self.accounts
            .mark_account_for_reauthentication(&account_id, provider)
            .await;

        let event = AuthEvent::ReauthRequired {
            account_id: account_id.to_string(),
            provider: provider.as_str().to_string(),
            at: self.clock.now(),
        };
        let _ = self.events.emit(event);

        info!(account_id = %account_id, "Account marked for re-authentication");
        Err(AuthError::NeedsReauthentication { account_id })
    }

    fn emit_auth_success(&self, account_id: &AccountId, provider: ProviderKind) {
        let event = AuthEvent::AuthSuccess {
            account_id: account_id.to_string(),
            provider: provider.as_str().to_string(),
            at: self.clock.now(),
        };
        let _ = self.events.emit(event);
    }
}
