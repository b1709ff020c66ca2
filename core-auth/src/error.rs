use crate::types::{AccountId, ProviderKind};
use thiserror::Error;

/// Error taxonomy for credential lifecycle operations.
///
/// Variants are `Clone` so a single failed refresh can be reported to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No active account for provider {provider}")]
    NoActiveAccount { provider: ProviderKind },

    #[error("No credentials stored for account {0}")]
    AccountNotFound(AccountId),

    #[error("Failed to encrypt credential material")]
    EncryptionFailed,

    #[error("Failed to decrypt stored credentials for account {account_id}")]
    DecryptionFailed { account_id: AccountId },

    #[error("Storage operation failed: {0}")]
    StorageFailed(String),

    #[error("Account {account_id} requires interactive re-authentication")]
    NeedsReauthentication { account_id: AccountId },

    #[error("Transient refresh failure: {cause}")]
    TransientError { cause: String },

    #[error("Sign-in was cancelled")]
    SignInCancelled,

    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    #[error("No backend configured for provider {provider}")]
    ProviderNotConfigured { provider: ProviderKind },
}

impl From<bridge_traits::BridgeError> for AuthError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        AuthError::StorageFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
