//! Workspace facade crate.
//!
//! Host applications can depend on `mail-auth-workspace` to pull in the
//! credential core without wiring each workspace crate individually.

pub use core_auth;
