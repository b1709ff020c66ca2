//! # Core Configuration Module
//!
//! Provides configuration management for the auth core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all injected platform capabilities and tunables for the
//! credential lifecycle coordinator. It enforces fail-fast validation so a
//! missing capability is reported at startup, not at first token request.
//!
//! ## Required Dependencies
//!
//! - `KeyValueStore` - Durable persistence for accounts, tokens, and active
//!   account selections
//! - `TokenCipher` - Encryption for credential material at rest
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Time source (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .key_value_store(Arc::new(MyStore))
//!     .token_cipher(Arc::new(MyCipher))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder validates all required dependencies and provides actionable error
//! messages when capabilities are missing.

use crate::error::{Error, Result};
use bridge_traits::{Clock, KeyValueStore, SystemClock, TokenCipher};
use std::sync::Arc;
use std::time::Duration;

/// Default safety margin subtracted from token expiry when judging freshness.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 300;

/// Default upper bound on a single refresh attempt.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(120);

/// Core configuration for the auth core.
///
/// This struct holds all dependencies and settings required to initialize
/// the credential lifecycle coordinator. Use [`CoreConfigBuilder`] to
/// construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Durable key-value persistence (required)
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// Cipher for credential material at rest (required)
    pub token_cipher: Arc<dyn TokenCipher>,

    /// Time source (defaults to `SystemClock`)
    pub clock: Arc<dyn Clock>,

    /// Safety margin subtracted from token expiry when judging freshness
    pub safety_margin: chrono::Duration,

    /// Upper bound on a single refresh attempt before it is treated as a
    /// transient failure
    pub refresh_timeout: Duration,

    /// Buffer size for the auth event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("token_cipher", &"TokenCipher { ... }")
            .field("clock", &"Clock { ... }")
            .field("safety_margin", &self.safety_margin)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The safety margin is non-negative
    /// - The refresh timeout is non-zero
    /// - The event buffer size is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.safety_margin < chrono::Duration::zero() {
            return Err(Error::Config(
                "Safety margin cannot be negative".to_string(),
            ));
        }

        if self.refresh_timeout.is_zero() {
            return Err(Error::Config(
                "Refresh timeout must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn key_value_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "KeyValueStore implementation is required for account and token persistence. \
                 Desktop: inject a file- or database-backed store. \
                 Mobile: inject a platform-native store."
            .to_string(),
    }
}

fn token_cipher_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "TokenCipher".to_string(),
        message: "TokenCipher implementation is required to protect credentials at rest. \
                 Desktop: inject a DPAPI/libsecret-backed cipher. \
                 Mobile: inject a Keychain/Keystore-backed cipher. \
                 Tests: use bridge_traits::PlaintextCipher."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
/// The builder validates required dependencies and provides helpful error
/// messages.
#[derive(Default)]
pub struct CoreConfigBuilder {
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    token_cipher: Option<Arc<dyn TokenCipher>>,
    clock: Option<Arc<dyn Clock>>,
    safety_margin: Option<chrono::Duration>,
    refresh_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the key-value store implementation (required).
    ///
    /// The store persists account metadata, encrypted credentials, and
    /// active account selections across process restarts.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Sets the token cipher implementation (required).
    ///
    /// The cipher protects access tokens and refresh handles before they
    /// reach the key-value store.
    pub fn token_cipher(mut self, cipher: Arc<dyn TokenCipher>) -> Self {
        self.token_cipher = Some(cipher);
        self
    }

    /// Sets the time source (optional).
    ///
    /// Defaults to `SystemClock`. Inject a fixed clock for deterministic
    /// expiry tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the safety margin subtracted from token expiry when judging
    /// freshness.
    ///
    /// Default: 300 seconds.
    pub fn safety_margin(mut self, margin: chrono::Duration) -> Self {
        self.safety_margin = Some(margin);
        self
    }

    /// Sets the upper bound on a single refresh attempt.
    ///
    /// Default: 120 seconds.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Sets the buffer size for the auth event bus.
    ///
    /// Default: 100 events.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// This validates all required dependencies are provided and returns
    /// an error with an actionable message if anything is missing.
    pub fn build(self) -> Result<CoreConfig> {
        let key_value_store = self
            .key_value_store
            .ok_or_else(key_value_store_missing_error)?;

        let token_cipher = self.token_cipher.ok_or_else(token_cipher_missing_error)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            key_value_store,
            token_cipher,
            clock,
            safety_margin: self
                .safety_margin
                .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS)),
            refresh_timeout: self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::PlaintextCipher;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mock implementations for testing
    #[derive(Default)]
    struct MockKeyValueStore {
        rows: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KeyValueStore for MockKeyValueStore {
        async fn put(&self, key: &str, value: &str) -> BridgeResult<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> BridgeResult<Option<String>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(key).cloned())
        }

        async fn remove(&self, key: &str) -> BridgeResult<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.remove(key);
            Ok(())
        }

        async fn list_keys(&self, prefix: &str) -> BridgeResult<Vec<String>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[test]
    fn test_builder_requires_key_value_store() {
        let result = CoreConfig::builder()
            .token_cipher(Arc::new(PlaintextCipher))
            .build();

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("KeyValueStore"));
        assert!(err_msg.contains("persistence"));
    }

    #[test]
    fn test_builder_requires_token_cipher() {
        let result = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .build();

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("TokenCipher"));
        assert!(err_msg.contains("credentials at rest"));
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .build()
            .unwrap();

        assert_eq!(
            config.safety_margin,
            chrono::Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS)
        );
        assert_eq!(config.refresh_timeout, DEFAULT_REFRESH_TIMEOUT);
        assert_eq!(
            config.event_buffer_size,
            crate::events::DEFAULT_EVENT_BUFFER_SIZE
        );
    }

    #[test]
    fn test_builder_with_custom_tunables() {
        let config = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .safety_margin(chrono::Duration::seconds(60))
            .refresh_timeout(Duration::from_secs(30))
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.safety_margin, chrono::Duration::seconds(60));
        assert_eq!(config.refresh_timeout, Duration::from_secs(30));
        assert_eq!(config.event_buffer_size, 16);
    }

    #[test]
    fn test_validate_rejects_negative_safety_margin() {
        let result = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .safety_margin(chrono::Duration::seconds(-1))
            .build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be negative"));
    }

    #[test]
    fn test_validate_rejects_zero_refresh_timeout() {
        let result = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .refresh_timeout(Duration::ZERO)
            .build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Refresh timeout"));
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .event_buffer_size(0)
            .build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Event buffer size"));
    }

    #[test]
    fn test_default_clock_is_system_clock() {
        let config = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .build()
            .unwrap();

        // System clock should report a plausible current time
        assert!(config.clock.unix_timestamp() > 0);
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .build()
            .unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.safety_margin, config.safety_margin);
        assert_eq!(cloned.refresh_timeout, config.refresh_timeout);
    }

    #[test]
    fn test_debug_redacts_capabilities() {
        let config = CoreConfig::builder()
            .key_value_store(Arc::new(MockKeyValueStore::default()))
            .token_cipher(Arc::new(PlaintextCipher))
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("KeyValueStore { ... }"));
        assert!(rendered.contains("TokenCipher { ... }"));
    }
}
