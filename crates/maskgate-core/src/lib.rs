//! maskgate core library
//!
//! Bitwise role-based access control:
//! - Per-bundle permission definitions and their registry
//! - Role compilation with cross-bundle negotiation
//! - Permission evaluation, memoization and ownership checks
//! - Configuration resolution and common error types

pub mod config;
pub mod error;
pub mod permissions;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use permissions::{AccessContext, MatchMode, PermissionCompiler, PermissionRegistry};
