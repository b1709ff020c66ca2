use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier for an authenticated account.
///
/// The value is the provider-issued subject identifier for the signed-in
/// user; it is opaque to this crate and stable across sign-ins of the same
/// account.
///
/// # Examples
///
/// ```
/// use core_auth::AccountId;
///
/// let id = AccountId::new("provider-subject-1234");
/// assert_eq!(id.as_str(), "provider-subject-1234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account ID from a provider-issued identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Supported identity providers.
///
/// Each provider has its own OAuth configuration and token semantics.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderKind;
///
/// let provider = ProviderKind::Google;
/// assert_eq!(provider.display_name(), "Google");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Google identity (OAuth 2.0 with raw refresh tokens)
    Google,
    /// Microsoft identity (token broker holding the refresh state)
    Microsoft,
}

impl ProviderKind {
    /// Get the human-readable display name for this provider
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::Google.display_name(), "Google");
    /// assert_eq!(ProviderKind::Microsoft.display_name(), "Microsoft");
    /// ```
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Microsoft => "Microsoft",
        }
    }

    /// Get the provider identifier string
    ///
    /// Used for logging and storage keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::Google.as_str(), "google");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Microsoft => "microsoft",
        }
    }

    /// Parse a provider kind from a string identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("google"), Some(ProviderKind::Google));
    /// assert_eq!(ProviderKind::parse("invalid"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google" => Some(ProviderKind::Google),
            "microsoft" => Some(ProviderKind::Microsoft),
            _ => None,
        }
    }

    /// All supported providers.
    pub fn all() -> [ProviderKind; 2] {
        [ProviderKind::Google, ProviderKind::Microsoft]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Profile metadata for a signed-in account.
///
/// Created on first successful sign-in and kept until explicit sign-out.
/// Display fields may be refreshed on later sign-ins of the same account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable provider-issued identifier
    pub id: AccountId,
    /// The provider this account belongs to
    pub provider: ProviderKind,
    /// Human-readable display name, if the provider supplied one
    pub display_name: Option<String>,
    /// Primary email address, if the provider supplied one
    pub email: Option<String>,
}

/// Credential set for an account.
///
/// Contains the short-lived access token plus the long-lived refresh
/// handle. Depending on the provider the refresh handle is either a raw
/// OAuth refresh token or an opaque key into an SDK-managed token cache;
/// this crate treats both as an opaque secret.
///
/// # Security
///
/// Both secrets must be stored encrypted and never logged. The `Debug`
/// implementation redacts them.
///
/// # Examples
///
/// ```
/// use core_auth::{AccountId, TokenRecord};
/// use chrono::{Duration, Utc};
/// use std::collections::BTreeSet;
///
/// let record = TokenRecord {
///     account_id: AccountId::new("acct-1"),
///     access_token: "ya29.a0...".to_string(),
///     refresh_handle: "1//0g...".to_string(),
///     scopes: BTreeSet::new(),
///     expires_at: Some(Utc::now() + Duration::hours(1)),
///     token_type: "Bearer".to_string(),
/// };
///
/// assert!(record.is_fresh(Utc::now(), Duration::seconds(300)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The account these credentials belong to
    pub account_id: AccountId,
    /// The access token used for API requests
    pub access_token: String,
    /// Opaque secret used to obtain new access tokens
    pub refresh_handle: String,
    /// Scopes granted to the access token
    pub scopes: BTreeSet<String>,
    /// When the access token expires (UTC); `None` when the provider did
    /// not report an expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Token type as reported by the provider (normally "Bearer")
    pub token_type: String,
}

impl TokenRecord {
    /// Check whether the access token can be served without refreshing.
    ///
    /// A record is fresh when the access token is non-empty and either no
    /// expiry is known or the expiry is further away than the safety
    /// margin. A token expiring exactly at `now + margin` is NOT fresh.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::{AccountId, TokenRecord};
    /// use chrono::{Duration, Utc};
    /// use std::collections::BTreeSet;
    ///
    /// let record = TokenRecord {
    ///     account_id: AccountId::new("acct-1"),
    ///     access_token: "token".to_string(),
    ///     refresh_handle: "refresh".to_string(),
    ///     scopes: BTreeSet::new(),
    ///     expires_at: Some(Utc::now() + Duration::minutes(2)),
    ///     token_type: "Bearer".to_string(),
    /// };
    ///
    /// // Expires inside the 5 minute margin
    /// assert!(!record.is_fresh(Utc::now(), Duration::seconds(300)));
    /// // but outside a 1 minute margin
    /// assert!(record.is_fresh(Utc::now(), Duration::seconds(60)));
    /// ```
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: chrono::Duration) -> bool {
        if self.access_token.is_empty() {
            return false;
        }

        match self.expires_at {
            Some(expires_at) => now + safety_margin < expires_at,
            None => true,
        }
    }

    /// Get the time remaining until token expiration
    ///
    /// Returns `None` if the token is already expired or has no known expiry.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let expires_at = self.expires_at?;
        if now >= expires_at {
            None
        } else {
            Some(expires_at - now)
        }
    }
}

// Custom Debug implementation to avoid logging secrets
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_handle", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}
