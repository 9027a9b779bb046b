//! Per-bundle permission definitions.
//!
//! A definition owns a [`PermissionTable`] (group → level → bit) and takes
//! part in role compilation through [`PermissionDefinition::analyze_permissions`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mask::Mask;
use super::principal::BundleMasks;
use crate::error::{Error, Result};

/// Levels of one permission group, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLevels {
    levels: Vec<(String, Mask)>,
}

impl GroupLevels {
    pub fn get(&self, level: &str) -> Option<Mask> {
        self.levels
            .iter()
            .find(|(name, _)| name == level)
            .map(|(_, bit)| *bit)
    }

    pub fn contains(&self, level: &str) -> bool {
        self.get(level).is_some()
    }

    /// Level names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Mask)> {
        self.levels.iter().map(|(name, bit)| (name.as_str(), *bit))
    }

    /// Union of every level bit in the group.
    pub fn all_bits(&self) -> Mask {
        self.levels
            .iter()
            .fold(Mask::EMPTY, |acc, (_, bit)| acc | *bit)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Group name → levels table for one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable {
    groups: BTreeMap<String, GroupLevels>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group. Every value must be a single usable bit, and no two
    /// levels of the group may share a name or a bit.
    pub fn add_group<I, S>(&mut self, group: &str, levels: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Mask)>,
        S: Into<String>,
    {
        let mut collected = GroupLevels::default();
        let mut used = Mask::EMPTY;
        for (level, bit) in levels {
            let level = level.into();
            if !bit.is_single_bit() {
                return Err(Error::InvalidArgument(format!(
                    "{group}:{level} must map to exactly one bit, got {bit}"
                )));
            }
            if used.intersects(bit) {
                return Err(Error::InvalidArgument(format!(
                    "{group}:{level} reuses bit {bit}"
                )));
            }
            if collected.contains(&level) {
                return Err(Error::InvalidArgument(format!(
                    "{group}:{level} is declared twice"
                )));
            }
            used |= bit;
            collected.levels.push((level, bit));
        }
        self.groups.insert(group.to_string(), collected);
        Ok(())
    }

    pub fn group(&self, group: &str) -> Option<&GroupLevels> {
        self.groups.get(group)
    }

    pub fn value(&self, group: &str, level: &str) -> Option<Mask> {
        self.groups.get(group)?.get(level)
    }

    pub fn is_supported(&self, group: &str, level: &str) -> bool {
        self.value(group, level).is_some()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &GroupLevels)> {
        self.groups.iter().map(|(name, levels)| (name.as_str(), levels))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Levels requested for each group of one bundle, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    groups: Vec<(String, Vec<String>)>,
}

impl BundleRequest {
    pub fn levels(&self, group: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, levels)| levels.as_slice())
    }

    /// Mutable level list for `group`, created empty if absent.
    pub fn levels_mut(&mut self, group: &str) -> &mut Vec<String> {
        let index = match self.groups.iter().position(|(name, _)| name == group) {
            Some(index) => index,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index].1
    }

    pub fn has(&self, group: &str, level: &str) -> bool {
        self.levels(group)
            .is_some_and(|levels| levels.iter().any(|l| l == level))
    }

    /// Add `level` to `group` unless already present. Returns whether it was added.
    pub fn grant(&mut self, group: &str, level: &str) -> bool {
        let levels = self.levels_mut(group);
        if levels.iter().any(|l| l == level) {
            return false;
        }
        levels.push(level.to_string());
        true
    }

    /// Replace the levels of `group`.
    pub fn set_levels(&mut self, group: &str, levels: Vec<String>) {
        *self.levels_mut(group) = levels;
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, levels)| (name.as_str(), levels.as_slice()))
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Requested permissions for every bundle, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedPermissions {
    bundles: Vec<(String, BundleRequest)>,
}

impl RequestedPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bundle: &str) -> Option<&BundleRequest> {
        self.bundles
            .iter()
            .find(|(name, _)| name == bundle)
            .map(|(_, request)| request)
    }

    /// Mutable request for `bundle`, created empty if absent.
    pub fn entry(&mut self, bundle: &str) -> &mut BundleRequest {
        let index = match self.bundles.iter().position(|(name, _)| name == bundle) {
            Some(index) => index,
            None => {
                self.bundles
                    .push((bundle.to_string(), BundleRequest::default()));
                self.bundles.len() - 1
            }
        };
        &mut self.bundles[index].1
    }

    pub fn contains_bundle(&self, bundle: &str) -> bool {
        self.get(bundle).is_some()
    }

    pub fn has(&self, bundle: &str, group: &str, level: &str) -> bool {
        self.get(bundle)
            .is_some_and(|request| request.has(group, level))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BundleRequest)> {
        self.bundles
            .iter()
            .map(|(name, request)| (name.as_str(), request))
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// A bundle's permission catalog and its role-compilation hooks.
///
/// Definitions are registered with a
/// [`PermissionRegistry`](super::registry::PermissionRegistry), which calls
/// [`define_permissions`](Self::define_permissions) once, on first access, for
/// enabled definitions only. After that the definition is shared read-only.
pub trait PermissionDefinition: Send + Sync {
    /// Bundle name this definition belongs to.
    fn name(&self) -> &str;

    /// Implementation identity, used as the secondary registry key.
    fn identity(&self) -> &str;

    /// Disabled definitions are never defined and support no permission.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Populate the permission table.
    fn define_permissions(&mut self) -> Result<()>;

    /// The permission table. Empty until defined.
    fn permissions(&self) -> &PermissionTable;

    fn is_supported(&self, group: &str, level: &str) -> bool {
        self.permissions().is_supported(group, level)
    }

    /// Name under which a requested `level` is stored during compilation.
    fn canonical_level<'a>(&self, group: &str, level: &'a str) -> &'a str {
        let _ = group;
        level
    }

    /// Bit value of `group:level`.
    fn value(&self, group: &str, level: &str) -> Result<Mask> {
        self.permissions().value(group, level).ok_or_else(|| {
            Error::UnknownPermission(format!(
                "{level} is not a level of {}:{group}",
                self.name()
            ))
        })
    }

    /// Whether stored group masks grant `group:level`.
    fn is_granted(&self, masks: &BundleMasks, group: &str, level: &str) -> bool {
        let Some(stored) = masks.get(group) else {
            return false;
        };
        self.value(group, level)
            .is_ok_and(|bit| stored.intersects(bit))
    }

    /// Adjust this bundle's requested levels during role compilation.
    ///
    /// `all` is a snapshot of every bundle's requests at call time. Returns
    /// `true` to be analyzed again in a later pass, once the bundles it depends
    /// on have been analyzed.
    fn analyze_permissions(
        &self,
        own: &mut BundleRequest,
        all: &RequestedPermissions,
        second_pass: bool,
    ) -> bool {
        let _ = (own, all, second_pass);
        false
    }

    /// Rewrite the level list shown for `group` in UI listings.
    fn ui_levels(&self, group: &str, levels: &mut Vec<String>) {
        let _ = (group, levels);
    }
}
