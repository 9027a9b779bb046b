//! Role compilation.
//!
//! Turns requested levels (`bundle:group` → levels) into one stored mask per
//! group. Before masks are computed every definition may adjust its own
//! requests through `analyze_permissions`; definitions that depend on other
//! bundles ask to be analyzed again once those bundles have had their turn.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::definition::{PermissionDefinition, RequestedPermissions};
use super::mask::Mask;
use super::registry::PermissionRegistry;
use super::token::split_group_key;
use crate::error::{Error, Result};

/// Default number of analysis passes: one full pass plus one for deferred bundles.
pub const DEFAULT_MAX_PASSES: u32 = 2;

/// One stored role mask: the persisted shape of a compiled role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub bundle: String,
    pub group: String,
    pub mask: Mask,
}

/// Compiles requested permissions into role entries.
#[derive(Debug)]
pub struct PermissionCompiler<'a> {
    registry: &'a PermissionRegistry,
    max_passes: u32,
}

impl<'a> PermissionCompiler<'a> {
    pub const fn new(registry: &'a PermissionRegistry) -> Self {
        Self {
            registry,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Bound the number of analysis passes (at least one).
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Compile a flat request map keyed by `bundle:group`.
    pub fn compile<I, K, V, S>(&self, requested: I) -> Result<Vec<RoleEntry>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut requests = RequestedPermissions::new();
        for (key, levels) in requested {
            let key = key.as_ref();
            let (bundle, group) = split_group_key(key).ok_or_else(|| {
                Error::MalformedPermission(format!("{key} must be formatted as bundle:group"))
            })?;
            requests
                .entry(bundle)
                .set_levels(group, levels.into_iter().map(Into::into).collect());
        }
        self.compile_requests(requests)
    }

    /// Compile already-grouped requests.
    pub fn compile_requests(&self, mut requests: RequestedPermissions) -> Result<Vec<RoleEntry>> {
        let catalog = self.registry.all();
        for definition in &catalog {
            let request = requests.entry(definition.name());
            for group in request.group_names() {
                let levels = request.levels_mut(&group);
                let mut seen = HashSet::new();
                let canonical: Vec<String> = levels
                    .iter()
                    .map(|level| definition.canonical_level(&group, level).to_string())
                    .filter(|level| seen.insert(level.clone()))
                    .collect();
                *levels = canonical;
            }
        }

        let passes = self.negotiate(&catalog, &mut requests);

        let mut entries = Vec::new();
        for (bundle, request) in requests.iter() {
            if request.is_empty() {
                continue;
            }
            let definition = self.registry.get(bundle)?;
            for (group, levels) in request.groups() {
                let mut mask = Mask::EMPTY;
                for level in levels {
                    if !definition.is_supported(group, level) {
                        return Err(Error::InvalidArgument(format!(
                            "{level} does not exist for {bundle}:{group}"
                        )));
                    }
                    mask |= definition.value(group, level)?;
                }
                entries.push(RoleEntry {
                    bundle: bundle.to_string(),
                    group: group.to_string(),
                    mask,
                });
            }
        }

        info!(entries = entries.len(), passes, "Compiled role permissions");
        Ok(entries)
    }

    /// Run analysis passes until no definition asks for another or the pass
    /// bound is reached. Returns the number of passes run.
    fn negotiate(
        &self,
        catalog: &[Arc<dyn PermissionDefinition>],
        requests: &mut RequestedPermissions,
    ) -> u32 {
        let mut pending: Vec<Arc<dyn PermissionDefinition>> = catalog.to_vec();
        let mut pass = 1;
        loop {
            let mut deferred = Vec::new();
            for definition in &pending {
                let snapshot = requests.clone();
                let own = requests.entry(definition.name());
                if definition.analyze_permissions(own, &snapshot, pass > 1) {
                    deferred.push(Arc::clone(definition));
                }
            }

            if deferred.is_empty() {
                return pass;
            }
            let names: Vec<&str> = deferred.iter().map(|d| d.name()).collect();
            if pass >= self.max_passes {
                warn!(pass, bundles = ?names, "Analysis pass limit reached with deferred bundles");
                return pass;
            }
            debug!(pass, bundles = ?names, "Deferring bundles to next analysis pass");
            pending = deferred;
            pass += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::permissions::definition::{BundleRequest, PermissionTable};
    use crate::permissions::standard::{GroupSpec, Preset, StandardDefinition};

    fn registry() -> PermissionRegistry {
        let registry = PermissionRegistry::empty();
        registry.register(Box::new(StandardDefinition::new(
            "lead",
            "lead.permissions",
            vec![
                GroupSpec::preset("leads", Preset::Extended),
                GroupSpec::preset("lists", Preset::Standard),
            ],
        )));
        registry.register(Box::new(StandardDefinition::new(
            "page",
            "page.permissions",
            vec![GroupSpec::preset("pages", Preset::StandardPublish)],
        )));
        registry
    }

    #[test]
    fn ors_level_bits() {
        let registry = registry();
        let entries = PermissionCompiler::new(&registry)
            .compile([("lead:lists", vec!["view", "create"])])
            .unwrap();
        assert_eq!(
            entries,
            vec![RoleEntry {
                bundle: "lead".to_string(),
                group: "lists".to_string(),
                mask: Mask::from_bits(4 | 32),
            }]
        );
    }

    #[test]
    fn unsupported_level_is_invalid_argument() {
        let registry = registry();
        let err = PermissionCompiler::new(&registry)
            .compile([("page:pages", vec!["fly"])])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("fly does not exist for page:pages"));
    }

    #[test]
    fn unknown_bundle_is_invalid_argument() {
        let registry = registry();
        let err = PermissionCompiler::new(&registry)
            .compile([("email:emails", vec!["view"])])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn malformed_key_is_rejected() {
        let registry = registry();
        let err = PermissionCompiler::new(&registry)
            .compile([("lead", vec!["view"])])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPermission(_)));
    }

    #[test]
    fn empty_request_yields_no_entries() {
        let registry = registry();
        let entries = PermissionCompiler::new(&registry)
            .compile(Vec::<(&str, Vec<&str>)>::new())
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn empty_level_list_yields_zero_mask() {
        let registry = registry();
        let entries = PermissionCompiler::new(&registry)
            .compile([("page:pages", Vec::<String>::new())])
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].mask.is_empty());
    }

    /// Asks for another pass every time it is analyzed.
    struct Restless {
        table: PermissionTable,
    }

    impl PermissionDefinition for Restless {
        fn name(&self) -> &str {
            "restless"
        }
        fn identity(&self) -> &str {
            "restless.permissions"
        }
        fn define_permissions(&mut self) -> Result<()> {
            let mut table = PermissionTable::new();
            table.add_group("things", [("view", Mask::from_bits(1))])?;
            self.table = table;
            Ok(())
        }
        fn permissions(&self) -> &PermissionTable {
            &self.table
        }
        fn analyze_permissions(&self, own: &mut BundleRequest, _: &RequestedPermissions, _: bool) -> bool {
            own.grant("things", "view");
            true
        }
    }

    #[test]
    fn pass_bound_stops_endless_deferral() {
        let registry = PermissionRegistry::empty();
        registry.register(Box::new(Restless {
            table: PermissionTable::new(),
        }));
        let compiler = PermissionCompiler::new(&registry).with_max_passes(5);
        let mut requests = RequestedPermissions::new();
        let catalog = registry.all();
        assert_eq!(compiler.negotiate(&catalog, &mut requests), 5);
        assert!(requests.has("restless", "things", "view"));
    }

    /// Defers on the first pass when `defers` is set and records each
    /// second-pass analysis. On the second pass it grants `things:edit`,
    /// or only once `after` has been granted it, when given.
    struct Deferring {
        name: &'static str,
        defers: bool,
        after: Option<&'static str>,
        calls: Arc<Mutex<Vec<String>>>,
        table: PermissionTable,
    }

    impl PermissionDefinition for Deferring {
        fn name(&self) -> &str {
            self.name
        }
        fn identity(&self) -> &str {
            self.name
        }
        fn define_permissions(&mut self) -> Result<()> {
            let mut table = PermissionTable::new();
            table.add_group(
                "things",
                [("view", Mask::from_bits(4)), ("edit", Mask::from_bits(16))],
            )?;
            self.table = table;
            Ok(())
        }
        fn permissions(&self) -> &PermissionTable {
            &self.table
        }
        fn analyze_permissions(&self, own: &mut BundleRequest, all: &RequestedPermissions, second_pass: bool) -> bool {
            if second_pass {
                self.calls.lock().unwrap().push(self.name.to_string());
                if self.after.is_none_or(|bundle| all.has(bundle, "things", "edit")) {
                    own.grant("things", "edit");
                }
            }
            self.defers && !second_pass
        }
    }

    #[test]
    fn deferred_bundles_rerun_in_signal_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = PermissionRegistry::empty();
        for (name, defers, after) in [
            ("steady", false, None),
            ("zeta", true, None),
            ("mid", false, None),
            ("alpha", true, Some("zeta")),
        ] {
            registry.register(Box::new(Deferring {
                name,
                defers,
                after,
                calls: Arc::clone(&calls),
                table: PermissionTable::new(),
            }));
        }

        let entries = PermissionCompiler::new(&registry)
            .compile(Vec::<(&str, Vec<&str>)>::new())
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["zeta", "alpha"]);
        let bundles: Vec<&str> = entries.iter().map(|entry| entry.bundle.as_str()).collect();
        assert_eq!(bundles, ["zeta", "alpha"]);
        // alpha saw zeta's second-pass grant
        assert!(entries.iter().all(|entry| entry.mask == Mask::from_bits(16)));
    }

    #[test]
    fn requested_synonyms_are_stored_under_defined_names() {
        let registry = registry();
        let mut requests = RequestedPermissions::new();
        requests
            .entry("lead")
            .set_levels("leads", vec!["edit".to_string(), "editother".to_string()]);
        let entries = PermissionCompiler::new(&registry)
            .compile_requests(requests)
            .unwrap();
        assert_eq!(entries[0].mask, Mask::from_bits(2 | 4 | 16));
    }
}
