//! Bundle catalogs declared in TOML or JSON.
//!
//! ```toml
//! [[bundles]]
//! name = "LeadBundle"
//!
//! [[bundles.definitions]]
//! name = "lead"
//!
//! [[bundles.definitions.groups]]
//! name = "leads"
//! preset = "extended"
//! ```
//!
//! Each declared definition registers a factory under its class identity
//! (`<name>.permissions` unless given) and a permission class keyed by its
//! name, so the registry constructs it on first lookup.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::definition::PermissionDefinition;
use super::registry::{BundleMetadata, DefinitionFactories, PermissionClass, PermissionRegistry};
use super::standard::{GroupSpec, StandardDefinition};
use crate::config::ConfigParams;
use crate::error::{Error, Result};

/// A declared permission definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionConfig {
    /// Bundle name used in permission tokens.
    pub name: String,
    /// Implementation identity. Defaults to `<name>.permissions`.
    #[serde(default)]
    pub class: Option<String>,
    /// Parameter that must be truthy for the definition to be enabled.
    #[serde(default)]
    pub enabled_param: Option<String>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

impl DefinitionConfig {
    pub fn class(&self) -> String {
        self.class
            .clone()
            .unwrap_or_else(|| format!("{}.permissions", self.name))
    }

    fn build(&self, params: &ConfigParams) -> StandardDefinition {
        let enabled = self
            .enabled_param
            .as_deref()
            .is_none_or(|key| params.flag(key));
        StandardDefinition::new(&self.name, &self.class(), self.groups.clone()).with_enabled(enabled)
    }
}

/// A bundle and the permission classes it contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub name: String,
    /// Classes built by factories supplied by the embedding application.
    #[serde(default)]
    pub permission_classes: Vec<PermissionClass>,
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,
}

impl BundleConfig {
    fn metadata(&self) -> BundleMetadata {
        let mut permission_classes = self.permission_classes.clone();
        permission_classes.extend(self.definitions.iter().map(|definition| PermissionClass {
            key: definition.name.clone(),
            class: definition.class(),
        }));
        BundleMetadata {
            name: self.name.clone(),
            permission_classes,
        }
    }
}

/// Core and plugin bundles of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
    #[serde(default)]
    pub plugin_bundles: Vec<BundleConfig>,
}

impl CatalogConfig {
    /// Load a catalog; `.toml` files are read as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            Ok(toml::from_str(&content)?)
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }

    /// Reject definitions sharing a name or class.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut classes = HashSet::new();
        for definition in self.definitions() {
            if !names.insert(definition.name.as_str()) {
                return Err(Error::Config(format!(
                    "permission definition {} is declared twice",
                    definition.name
                )));
            }
            if !classes.insert(definition.class()) {
                return Err(Error::Config(format!(
                    "permission class {} is declared twice",
                    definition.class()
                )));
            }
        }
        Ok(())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &DefinitionConfig> {
        self.bundles
            .iter()
            .chain(&self.plugin_bundles)
            .flat_map(|bundle| &bundle.definitions)
    }

    /// Build a registry. `factories` supplies the classes named in
    /// `permission_classes`; declared definitions are added alongside.
    pub fn into_registry(
        self,
        params: ConfigParams,
        mut factories: DefinitionFactories,
    ) -> Result<PermissionRegistry> {
        self.validate()?;
        for definition in self.definitions() {
            let declared = definition.clone();
            factories.register(&definition.class(), move |params| {
                let built: Box<dyn PermissionDefinition> = Box::new(declared.build(params));
                Ok(built)
            });
        }
        debug!(
            bundles = self.bundles.len(),
            plugin_bundles = self.plugin_bundles.len(),
            factories = factories.len(),
            "Building permission registry from catalog"
        );

        let bundles: Vec<BundleMetadata> = self.bundles.iter().map(BundleConfig::metadata).collect();
        let plugins: Vec<BundleMetadata> = self
            .plugin_bundles
            .iter()
            .map(BundleConfig::metadata)
            .collect();
        Ok(PermissionRegistry::new(&bundles, &plugins, factories, params))
    }
}
