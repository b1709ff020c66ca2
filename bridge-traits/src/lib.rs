//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the auth core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Security & Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable string-keyed persistence
//! - [`TokenCipher`](crypto::TokenCipher) - Encryption for credential material at rest
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core should fail fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::CoreError;
//!
//! pub fn new(config: CoreConfig) -> Result<Self> {
//!     let store = config.key_value_store
//!         .ok_or_else(|| CoreError::CapabilityMissing {
//!             capability: "KeyValueStore".to_string(),
//!             message: "No key-value store implementation provided. \
//!                      Desktop: wire a file-backed store. \
//!                      Mobile: inject platform-native adapter.".to_string()
//!         })?;
//!     // ...
//! }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., key names, storage backend status)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.

pub mod crypto;
pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use crypto::{PlaintextCipher, TokenCipher};
pub use storage::KeyValueStore;
pub use time::{Clock, SystemClock};
