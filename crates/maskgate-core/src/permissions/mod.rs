//! Bitwise role-based permission engine.
//!
//! Bundles contribute [`PermissionDefinition`]s (group → level → bit) to a
//! [`PermissionRegistry`]. Roles are compiled once by the
//! [`PermissionCompiler`] into per-group [`Mask`]s; an [`AccessContext`]
//! evaluates `bundle:group:level` tokens against a principal's stored masks.

pub mod catalog;
pub mod compiler;
pub mod definition;
pub mod evaluator;
pub mod mask;
pub mod ownership;
pub mod principal;
pub mod registry;
pub mod standard;
pub mod token;
pub mod translate;

pub use catalog::{BundleConfig, CatalogConfig, DefinitionConfig};
pub use compiler::{PermissionCompiler, RoleEntry};
pub use definition::{BundleRequest, PermissionDefinition, PermissionTable, RequestedPermissions};
pub use evaluator::{AccessContext, Decision, EvalOptions, MatchMode};
pub use mask::Mask;
pub use ownership::{Owner, PermissionArg};
pub use principal::{ActivePermissions, Anonymous, Principal, User};
pub use registry::{BundleMetadata, DefinitionFactories, PermissionClass, PermissionRegistry};
pub use standard::{GroupSpec, Preset, StandardDefinition};
pub use token::PermissionToken;
pub use translate::{DefaultMessages, Translator};
