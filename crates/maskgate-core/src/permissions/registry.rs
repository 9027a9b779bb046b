//! Permission definition registry.
//!
//! Holds one definition per bundle, found by bundle name or implementation
//! identity. Definitions either arrive ready-made through
//! [`PermissionRegistry::register`] or are constructed on demand by a factory
//! registered for their identity. Enabled definitions are defined on first
//! access and shared read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::definition::PermissionDefinition;
use crate::config::ConfigParams;
use crate::error::{Error, Result};

/// Builds a definition from configuration parameters.
pub type DefinitionFactory =
    Box<dyn Fn(&ConfigParams) -> Result<Box<dyn PermissionDefinition>> + Send + Sync>;

/// Factories keyed by implementation identity.
#[derive(Default)]
pub struct DefinitionFactories {
    factories: HashMap<String, DefinitionFactory>,
}

impl DefinitionFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `identity`, replacing any previous one.
    pub fn register<F>(&mut self, identity: &str, factory: F)
    where
        F: Fn(&ConfigParams) -> Result<Box<dyn PermissionDefinition>> + Send + Sync + 'static,
    {
        self.factories.insert(identity.to_string(), Box::new(factory));
    }

    #[must_use]
    pub fn with<F>(mut self, identity: &str, factory: F) -> Self
    where
        F: Fn(&ConfigParams) -> Result<Box<dyn PermissionDefinition>> + Send + Sync + 'static,
    {
        self.register(identity, factory);
        self
    }

    pub fn get(&self, identity: &str) -> Option<&DefinitionFactory> {
        self.factories.get(identity)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for DefinitionFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// A permission class a bundle registers: lookup key and implementation identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionClass {
    pub key: String,
    pub class: String,
}

/// Bundle registration metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub name: String,
    #[serde(default)]
    pub permission_classes: Vec<PermissionClass>,
}

/// Build state of the full catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    Uninitialized,
    Building,
    Ready,
}

struct Slot {
    pending: Option<Box<dyn PermissionDefinition>>,
    ready: Option<Arc<dyn PermissionDefinition>>,
}

impl Slot {
    fn new(definition: Box<dyn PermissionDefinition>) -> Self {
        Self {
            pending: Some(definition),
            ready: None,
        }
    }

    fn ready(&mut self) -> Result<Arc<dyn PermissionDefinition>> {
        if let Some(ready) = &self.ready {
            return Ok(Arc::clone(ready));
        }
        let Some(mut definition) = self.pending.take() else {
            return Err(Error::InvalidArgument(
                "permission definition is unavailable".to_string(),
            ));
        };
        if definition.is_enabled() {
            if let Err(e) = definition.define_permissions() {
                self.pending = Some(definition);
                return Err(e);
            }
            debug!(bundle = definition.name(), "Defined permissions");
        }
        let ready: Arc<dyn PermissionDefinition> = Arc::from(definition);
        self.ready = Some(Arc::clone(&ready));
        Ok(ready)
    }
}

struct Inner {
    state: CatalogState,
    slots: Vec<Slot>,
    by_name: HashMap<String, usize>,
    by_identity: HashMap<String, usize>,
}

impl Inner {
    fn lookup(&self, key: &str) -> Option<usize> {
        self.by_name
            .get(key)
            .or_else(|| self.by_identity.get(key))
            .copied()
    }

    fn insert(&mut self, definition: Box<dyn PermissionDefinition>) -> usize {
        let name = definition.name().to_string();
        let identity = definition.identity().to_string();
        let index = if let Some(&index) = self.by_name.get(&name) {
            self.slots[index] = Slot::new(definition);
            self.by_identity.retain(|_, slot| *slot != index);
            index
        } else {
            self.slots.push(Slot::new(definition));
            self.slots.len() - 1
        };
        self.by_name.insert(name, index);
        self.by_identity.insert(identity, index);
        index
    }
}

/// Registry of permission definitions for core and plugin bundles.
pub struct PermissionRegistry {
    classes: Vec<PermissionClass>,
    factories: DefinitionFactories,
    params: ConfigParams,
    inner: RwLock<Inner>,
}

impl PermissionRegistry {
    /// Create a registry from bundle metadata. Core bundle classes come first,
    /// then plugin bundle classes.
    pub fn new(
        bundles: &[BundleMetadata],
        plugin_bundles: &[BundleMetadata],
        factories: DefinitionFactories,
        params: ConfigParams,
    ) -> Self {
        let classes = bundles
            .iter()
            .chain(plugin_bundles)
            .flat_map(|bundle| bundle.permission_classes.iter().cloned())
            .collect();
        Self {
            classes,
            factories,
            params,
            inner: RwLock::new(Inner {
                state: CatalogState::Uninitialized,
                slots: Vec::new(),
                by_name: HashMap::new(),
                by_identity: HashMap::new(),
            }),
        }
    }

    /// An empty registry; definitions are added with [`register`](Self::register).
    pub fn empty() -> Self {
        Self::new(&[], &[], DefinitionFactories::new(), ConfigParams::new())
    }

    /// Register a ready-made definition under its name and identity.
    /// A definition with the same name is replaced.
    pub fn register(&self, definition: Box<dyn PermissionDefinition>) {
        let name = definition.name().to_string();
        self.write().insert(definition);
        debug!(bundle = %name, "Registered permission definition");
    }

    /// Resolve a definition by bundle name, then implementation identity,
    /// then by constructing it from its registered factory.
    pub fn get(&self, bundle: &str) -> Result<Arc<dyn PermissionDefinition>> {
        if bundle.is_empty() {
            return Err(Error::InvalidArgument(
                "bundle must be specified".to_string(),
            ));
        }

        let known = {
            let inner = self.read();
            match inner.lookup(bundle) {
                Some(index) => {
                    if let Some(ready) = &inner.slots[index].ready {
                        return Ok(Arc::clone(ready));
                    }
                    true
                }
                None => false,
            }
        };

        // Factories run without the lock held; they may consult the registry.
        let constructed = if known {
            None
        } else {
            Some(self.instantiate(bundle)?)
        };

        let mut inner = self.write();
        let index = match (inner.lookup(bundle), constructed) {
            (Some(index), _) => index,
            (None, Some(definition)) => {
                if let Some(index) = inner.lookup(definition.identity()) {
                    // Reached through a class key whose identity is already loaded.
                    index
                } else {
                    inner.insert(definition)
                }
            }
            (None, None) => {
                return Err(Error::InvalidArgument(format!(
                    "permission definition {bundle} was replaced during lookup"
                )));
            }
        };
        inner.slots[index].ready()
    }

    /// Like [`get`](Self::get) but returns `None` instead of failing.
    pub fn find(&self, bundle: &str) -> Option<Arc<dyn PermissionDefinition>> {
        match self.get(bundle) {
            Ok(definition) => Some(definition),
            Err(e) => {
                debug!(bundle, error = %e, "Permission definition not found");
                None
            }
        }
    }

    /// Every definition, in registration order. Registered classes are
    /// constructed on the first call; classes that cannot be constructed are
    /// skipped.
    pub fn all(&self) -> Vec<Arc<dyn PermissionDefinition>> {
        if self.state() != CatalogState::Ready {
            self.write().state = CatalogState::Building;
            for class in &self.classes {
                if let Err(e) = self.get(&class.class) {
                    warn!(class = %class.class, error = %e, "Skipping permission class");
                }
            }
            let mut inner = self.write();
            inner.state = CatalogState::Ready;
            info!(definitions = inner.slots.len(), "Permission catalog ready");
        }

        let mut inner = self.write();
        inner
            .slots
            .iter_mut()
            .filter_map(|slot| match slot.ready() {
                Ok(definition) => Some(definition),
                Err(e) => {
                    warn!(error = %e, "Skipping permission definition");
                    None
                }
            })
            .collect()
    }

    /// Names of every definition in the catalog.
    pub fn names(&self) -> Vec<String> {
        self.all()
            .iter()
            .map(|definition| definition.name().to_string())
            .collect()
    }

    pub fn state(&self) -> CatalogState {
        self.read().state
    }

    fn instantiate(&self, key: &str) -> Result<Box<dyn PermissionDefinition>> {
        let class = self
            .classes
            .iter()
            .find(|class| class.key == key || class.class == key)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Permission class not found for {key} in permission classes"
                ))
            })?;
        let factory = self.factories.get(&class.class).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "No factory registered for permission class {}",
                class.class
            ))
        })?;
        let definition = factory(&self.params)?;
        debug!(class = %class.class, bundle = definition.name(), "Constructed permission definition");
        Ok(definition)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PermissionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionRegistry")
            .field("classes", &self.classes)
            .field("factories", &self.factories)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{OnceLock, Weak};

    use super::*;
    use crate::permissions::standard::{GroupSpec, Preset, StandardDefinition};

    fn lead_definition() -> Box<dyn PermissionDefinition> {
        Box::new(StandardDefinition::new(
            "lead",
            "lead.permissions",
            vec![GroupSpec::preset("leads", Preset::Standard)],
        ))
    }

    fn registry_with_lead_factory() -> PermissionRegistry {
        let bundles = vec![BundleMetadata {
            name: "LeadBundle".to_string(),
            permission_classes: vec![PermissionClass {
                key: "lead".to_string(),
                class: "lead.permissions".to_string(),
            }],
        }];
        let factories = DefinitionFactories::new().with("lead.permissions", |_| Ok(lead_definition()));
        PermissionRegistry::new(&bundles, &[], factories, ConfigParams::new())
    }

    #[test]
    fn register_defines_lazily() {
        let registry = PermissionRegistry::empty();
        registry.register(lead_definition());
        let lead = registry.get("lead").unwrap();
        assert!(lead.is_supported("leads", "view"));
    }

    #[test]
    fn lookup_by_identity() {
        let registry = PermissionRegistry::empty();
        registry.register(lead_definition());
        let lead = registry.get("lead.permissions").unwrap();
        assert_eq!(lead.name(), "lead");
    }

    #[test]
    fn factory_fallback_by_key_and_class() {
        let registry = registry_with_lead_factory();
        let by_key = registry.get("lead").unwrap();
        let by_class = registry.get("lead.permissions").unwrap();
        assert!(Arc::ptr_eq(&by_key, &by_class));
    }

    #[test]
    fn missing_class_is_invalid_argument() {
        let registry = PermissionRegistry::empty();
        assert!(matches!(registry.get("page"), Err(Error::InvalidArgument(_))));
        assert!(registry.find("page").is_none());
        assert!(matches!(registry.get(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn class_without_factory_is_invalid_argument() {
        let bundles = vec![BundleMetadata {
            name: "PageBundle".to_string(),
            permission_classes: vec![PermissionClass {
                key: "page".to_string(),
                class: "page.permissions".to_string(),
            }],
        }];
        let registry = PermissionRegistry::new(&bundles, &[], DefinitionFactories::new(), ConfigParams::new());
        let err = registry.get("page").err().unwrap();
        assert!(err.to_string().contains("No factory registered"));
    }

    #[test]
    fn all_builds_once_and_skips_broken_classes() {
        let bundles = vec![BundleMetadata {
            name: "LeadBundle".to_string(),
            permission_classes: vec![PermissionClass {
                key: "lead".to_string(),
                class: "lead.permissions".to_string(),
            }],
        }];
        let plugins = vec![BundleMetadata {
            name: "BrokenBundle".to_string(),
            permission_classes: vec![PermissionClass {
                key: "broken".to_string(),
                class: "broken.permissions".to_string(),
            }],
        }];
        let factories = DefinitionFactories::new().with("lead.permissions", |_| Ok(lead_definition()));
        let registry = PermissionRegistry::new(&bundles, &plugins, factories, ConfigParams::new());

        assert_eq!(registry.state(), CatalogState::Uninitialized);
        assert_eq!(registry.names(), ["lead".to_string()]);
        assert_eq!(registry.state(), CatalogState::Ready);
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn disabled_definition_is_not_defined() {
        let registry = PermissionRegistry::empty();
        registry.register(Box::new(
            StandardDefinition::new("api", "api.permissions", vec![GroupSpec::preset("access", Preset::Manage)])
                .with_enabled(false),
        ));
        let api = registry.get("api").unwrap();
        assert!(!api.is_enabled());
        assert!(api.permissions().is_empty());
        assert!(!api.is_supported("access", "manage"));
    }

    #[test]
    fn replacing_a_definition_drops_its_old_identity() {
        let registry = PermissionRegistry::empty();
        registry.register(lead_definition());
        registry.register(Box::new(StandardDefinition::new(
            "lead",
            "lead.v2.permissions",
            vec![GroupSpec::preset("leads", Preset::Extended)],
        )));

        assert!(registry.find("lead.permissions").is_none());
        let lead = registry.get("lead.v2.permissions").unwrap();
        assert!(lead.is_supported("leads", "viewown"));
        assert_eq!(registry.names(), ["lead".to_string()]);
    }

    #[test]
    fn factory_may_consult_the_registry() {
        let handle: Arc<OnceLock<Weak<PermissionRegistry>>> = Arc::new(OnceLock::new());
        let bundles = vec![BundleMetadata {
            name: "ReportBundle".to_string(),
            permission_classes: vec![PermissionClass {
                key: "report".to_string(),
                class: "report.permissions".to_string(),
            }],
        }];
        let factory_handle = Arc::clone(&handle);
        let factories = DefinitionFactories::new().with("report.permissions", move |_| {
            let registry = factory_handle
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| Error::InvalidArgument("registry is gone".to_string()))?;
            let lead = registry.get("lead")?;
            let mut reports = GroupSpec::preset("reports", Preset::Standard);
            if lead.is_supported("leads", "edit") {
                reports = reports.with_implication("lead:leads:edit", "view");
            }
            let definition: Box<dyn PermissionDefinition> =
                Box::new(StandardDefinition::new("report", "report.permissions", vec![reports]));
            Ok(definition)
        });

        let registry = Arc::new(PermissionRegistry::new(&bundles, &[], factories, ConfigParams::new()));
        registry.register(lead_definition());
        handle.set(Arc::downgrade(&registry)).unwrap();

        let report = registry.get("report").unwrap();
        assert!(report.is_supported("reports", "view"));
    }
}
