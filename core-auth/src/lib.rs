//! # Authentication Module
//!
//! Credential lifecycle coordination for multiple identity providers.
//!
//! ## Overview
//!
//! This crate keeps signed-in accounts usable: it stores their tokens
//! encrypted at rest, tracks which account is active per provider, serves
//! valid bearer tokens on demand, and refreshes them through pluggable
//! provider backends with at most one refresh in flight per account.
//!
//! ## Features
//!
//! - Encrypted persistence of access tokens and refresh handles
//! - Per-provider active account selection with change notifications
//! - Single-flight token refresh with configurable expiry safety margin
//! - Permanent-denial recovery: wipe, flag for re-auth, notify
//! - Interactive sign-in and sign-out delegated to provider backends

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod store;
pub mod types;

pub use backend::{AccountRepository, IdentityBackend, RefreshError, SignInError};
pub use coordinator::TokenCoordinator;
pub use error::{AuthError, Result};
pub use registry::{ActiveAccountChanged, ActiveAccountRegistry};
pub use store::EncryptedTokenStore;
pub use types::{Account, AccountId, ProviderKind, TokenRecord};
