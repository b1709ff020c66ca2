//! Encrypted Token Storage
//!
//! This module persists account profiles and their credentials through the
//! host's `KeyValueStore`, with both secrets passed through the injected
//! `TokenCipher` before they touch disk.
//!
//! ## Security Features
//!
//! - Access tokens and refresh handles are stored only in encrypted form
//! - Secrets are never logged or exposed in error messages
//! - Unreadable ciphertext surfaces as a distinct, recoverable error
//! - Secure erasure on sign-out
//!
//! ## Row layout
//!
//! One JSON row per account under `account:{account_id}`, holding the
//! profile metadata plus an optional credential block (base64 ciphertexts).
//! A row with no credential block represents an account awaiting
//! re-authentication: the profile survives, the secrets are gone.

use crate::error::{AuthError, Result};
use crate::types::{Account, AccountId, ProviderKind, TokenRecord};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_traits::{KeyValueStore, TokenCipher};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key prefix for account rows in the key-value store.
const KEY_PREFIX: &str = "account:";

/// Encrypted persistence for accounts and their credentials.
#[derive(Clone)]
pub struct EncryptedTokenStore {
    kv: Arc<dyn KeyValueStore>,
    cipher: Arc<dyn TokenCipher>,
}

/// Credential block of a stored row. Secret fields hold base64-encoded
/// ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    access_token: String,
    refresh_handle: String,
    scopes: std::collections::BTreeSet<String>,
    expires_at_ms: Option<i64>,
    token_type: String,
}

/// One persisted account row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    id: AccountId,
    provider: ProviderKind,
    display_name: Option<String>,
    email: Option<String>,
    credentials: Option<StoredCredentials>,
}

impl EncryptedTokenStore {
    /// Create a new store over the given persistence and cipher.
    pub fn new(kv: Arc<dyn KeyValueStore>, cipher: Arc<dyn TokenCipher>) -> Self {
        debug!("Initializing EncryptedTokenStore");
        Self { kv, cipher }
    }

    /// Persist an account together with its credentials.
    ///
    /// Both secrets are encrypted before serialization; if either
    /// encryption fails nothing is written and `EncryptionFailed` is
    /// returned. An existing row for the same account is replaced.
    pub async fn put(&self, account: &Account, record: &TokenRecord) -> Result<()> {
        if record.account_id != account.id {
            return Err(AuthError::StorageFailed(format!(
                "token record belongs to account {} but was stored for {}",
                record.account_id, account.id
            )));
        }

        let access_ct = self
            .cipher
            .encrypt(record.access_token.as_bytes())
            .ok_or(AuthError::EncryptionFailed)?;
        let refresh_ct = self
            .cipher
            .encrypt(record.refresh_handle.as_bytes())
            .ok_or(AuthError::EncryptionFailed)?;

        let row = StoredRow {
            id: account.id.clone(),
            provider: account.provider,
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            credentials: Some(StoredCredentials {
                access_token: BASE64.encode(access_ct),
                refresh_handle: BASE64.encode(refresh_ct),
                scopes: record.scopes.clone(),
                expires_at_ms: record.expires_at.map(|t| t.timestamp_millis()),
                token_type: record.token_type.clone(),
            }),
        };

        let json = serde_json::to_string(&row)
            .map_err(|e| AuthError::StorageFailed(format!("row serialization failed: {}", e)))?;

        self.kv.put(&storage_key(&account.id), &json).await?;

        info!(
            account_id = %account.id,
            provider = %account.provider.as_str(),
            has_expiry = record.expires_at.is_some(),
            "Credentials stored"
        );

        Ok(())
    }

    /// Load the credentials for an account.
    ///
    /// Returns `Ok(None)` when no credentials exist, either because the
    /// account is unknown or because its credentials were wiped. Returns
    /// `DecryptionFailed` when the row or its ciphertext cannot be read;
    /// callers treat that as a recoverable, account-scoped condition.
    pub async fn get(&self, account_id: &AccountId) -> Result<Option<TokenRecord>> {
        let Some(json) = self.kv.get(&storage_key(account_id)).await? else {
            debug!(account_id = %account_id, "No stored row for account");
            return Ok(None);
        };

        let row = self.parse_row(account_id, &json)?;

        let Some(creds) = row.credentials else {
            debug!(account_id = %account_id, "Account row has no credentials");
            return Ok(None);
        };

        let access_token = self.decrypt_field(account_id, &creds.access_token)?;
        let refresh_handle = self.decrypt_field(account_id, &creds.refresh_handle)?;

        Ok(Some(TokenRecord {
            account_id: row.id,
            access_token,
            refresh_handle,
            scopes: creds.scopes,
            expires_at: creds
                .expires_at_ms
                .and_then(DateTime::from_timestamp_millis),
            token_type: creds.token_type,
        }))
    }

    /// Load the profile metadata for an account, credentials or not.
    pub async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let Some(json) = self.kv.get(&storage_key(account_id)).await? else {
            return Ok(None);
        };

        let row = self.parse_row(account_id, &json)?;

        Ok(Some(Account {
            id: row.id,
            provider: row.provider,
            display_name: row.display_name,
            email: row.email,
        }))
    }

    /// Erase the credentials for an account.
    ///
    /// With `remove_account_row` the whole row is deleted (sign-out);
    /// without it only the credential block is wiped and the profile
    /// metadata survives (pending re-authentication). Idempotent.
    pub async fn clear(&self, account_id: &AccountId, remove_account_row: bool) -> Result<()> {
        let key = storage_key(account_id);

        if remove_account_row {
            self.kv.remove(&key).await?;
            info!(account_id = %account_id, "Account row removed");
            return Ok(());
        }

        let Some(json) = self.kv.get(&key).await? else {
            return Ok(());
        };

        let mut row = match serde_json::from_str::<StoredRow>(&json) {
            Ok(row) => row,
            Err(e) => {
                // Unreadable row with nothing worth preserving
                warn!(
                    account_id = %account_id,
                    error = %e,
                    "Removing malformed account row during credential wipe"
                );
                self.kv.remove(&key).await?;
                return Ok(());
            }
        };

        if row.credentials.is_some() {
            row.credentials = None;
            let json = serde_json::to_string(&row).map_err(|e| {
                AuthError::StorageFailed(format!("row serialization failed: {}", e))
            })?;
            self.kv.put(&key, &json).await?;
            info!(account_id = %account_id, "Credentials wiped, profile kept");
        }

        Ok(())
    }

    /// Enumerate the persisted accounts for a provider.
    ///
    /// Malformed rows are skipped with a warning rather than failing the
    /// whole listing.
    pub async fn list_accounts(&self, provider: ProviderKind) -> Result<Vec<Account>> {
        let keys = self.kv.list_keys(KEY_PREFIX).await?;

        let mut accounts = Vec::new();
        for key in keys {
            let Some(json) = self.kv.get(&key).await? else {
                continue;
            };

            let row = match serde_json::from_str::<StoredRow>(&json) {
                Ok(row) => row,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed account row");
                    continue;
                }
            };

            if row.provider == provider {
                accounts.push(Account {
                    id: row.id,
                    provider: row.provider,
                    display_name: row.display_name,
                    email: row.email,
                });
            }
        }

        debug!(
            provider = %provider.as_str(),
            count = accounts.len(),
            "Listed persisted accounts"
        );

        Ok(accounts)
    }

    fn parse_row(&self, account_id: &AccountId, json: &str) -> Result<StoredRow> {
        serde_json::from_str(json).map_err(|e| {
            warn!(
                account_id = %account_id,
                error = %e,
                "Stored account row is unreadable"
            );
            AuthError::DecryptionFailed {
                account_id: account_id.clone(),
            }
        })
    }

    fn decrypt_field(&self, account_id: &AccountId, b64_ciphertext: &str) -> Result<String> {
        let failure = || AuthError::DecryptionFailed {
            account_id: account_id.clone(),
        };

        let ciphertext = BASE64.decode(b64_ciphertext).map_err(|_| failure())?;
        let plaintext = self.cipher.decrypt(&ciphertext).ok_or_else(failure)?;
        String::from_utf8(plaintext).map_err(|_| failure())
    }
}

fn storage_key(account_id: &AccountId) -> String {
    format!("{}{}", KEY_PREFIX, account_id)
}
