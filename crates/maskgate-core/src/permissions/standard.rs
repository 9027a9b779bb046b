//! Declarative permission definitions built from presets and explicit levels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::definition::{BundleRequest, PermissionDefinition, PermissionTable, RequestedPermissions};
use super::mask::Mask;
use super::token::PermissionToken;
use crate::error::{Error, Result};

/// Level every preset uses for "everything in this group".
pub const FULL: &str = "full";

/// Stock level sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// view, edit, create, delete, full
    Standard,
    /// Standard plus publish
    StandardPublish,
    /// own/other variants of view, edit, delete, publish, plus create and full
    Extended,
    /// manage
    Manage,
}

impl Preset {
    pub const fn levels(self) -> &'static [(&'static str, u32)] {
        match self {
            Self::Standard => &[
                ("view", 4),
                ("edit", 16),
                ("create", 32),
                ("delete", 128),
                ("full", 1024),
            ],
            Self::StandardPublish => &[
                ("view", 4),
                ("edit", 16),
                ("create", 32),
                ("delete", 128),
                ("publish", 512),
                ("full", 1024),
            ],
            Self::Extended => &[
                ("viewown", 2),
                ("viewother", 4),
                ("editown", 8),
                ("editother", 16),
                ("create", 32),
                ("deleteown", 64),
                ("deleteother", 128),
                ("publishown", 256),
                ("publishother", 512),
                ("full", 1024),
            ],
            Self::Manage => &[("manage", 1024)],
        }
    }
}

/// Grant `grant` in the declaring group whenever `when` is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implication {
    /// `bundle:group:level` that triggers the grant.
    pub when: String,
    /// Level of the declaring group to add.
    pub grant: String,
}

/// One group of a declarative definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub preset: Option<Preset>,
    /// Explicit levels (name → bit value), added after the preset.
    #[serde(default)]
    pub levels: BTreeMap<String, u32>,
    #[serde(default)]
    pub implies: Vec<Implication>,
}

impl GroupSpec {
    pub fn preset(name: &str, preset: Preset) -> Self {
        Self {
            name: name.to_string(),
            preset: Some(preset),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: &str, bit: u32) -> Self {
        self.levels.insert(level.to_string(), bit);
        self
    }

    #[must_use]
    pub fn with_implication(mut self, when: &str, grant: &str) -> Self {
        self.implies.push(Implication {
            when: when.to_string(),
            grant: grant.to_string(),
        });
        self
    }

    fn level_values(&self) -> Vec<(String, Mask)> {
        let mut levels: Vec<(String, Mask)> = self
            .preset
            .map(Preset::levels)
            .unwrap_or_default()
            .iter()
            .map(|(name, bit)| ((*name).to_string(), Mask::from_bits(*bit)))
            .collect();
        let mut explicit: Vec<(String, Mask)> = self
            .levels
            .iter()
            .map(|(name, bit)| (name.clone(), Mask::from_bits(*bit)))
            .collect();
        explicit.sort_by_key(|(_, bit)| *bit);
        levels.extend(explicit);
        levels
    }
}

/// Levels that must accompany a requested level.
fn required_levels(level: &str) -> &'static [&'static str] {
    match level {
        "edit" | "editother" | "publish" | "publishother" => &["viewother", "viewown"],
        "delete" | "deleteother" => &["editother", "viewother", "viewown"],
        "viewother" | "editown" | "deleteown" | "publishown" | "create" => &["viewown"],
        _ => &[],
    }
}

/// Names under which another bundle may have stored `level`. Requests hold
/// the name their group defines, so a plain level also matches its `other`
/// form and an `own`/`other` level also matches the plain form.
fn trigger_forms(level: &str) -> Vec<String> {
    let mut forms = vec![level.to_string()];
    for base in ["view", "edit", "delete", "publish"] {
        if level == base {
            forms.push(format!("{base}other"));
        } else if level
            .strip_prefix(base)
            .is_some_and(|rest| rest == "own" || rest == "other")
        {
            forms.push(base.to_string());
        }
    }
    forms
}

/// A definition described entirely by data: presets, explicit levels and
/// implication rules.
#[derive(Debug, Clone)]
pub struct StandardDefinition {
    name: String,
    identity: String,
    enabled: bool,
    groups: Vec<GroupSpec>,
    table: PermissionTable,
}

impl StandardDefinition {
    pub fn new(name: &str, identity: &str, groups: Vec<GroupSpec>) -> Self {
        Self {
            name: name.to_string(),
            identity: identity.to_string(),
            enabled: true,
            groups,
            table: PermissionTable::new(),
        }
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Resolve a level to the name the group actually defines.
    ///
    /// `view` and `viewother`/`viewown` stand in for each other depending on
    /// whether the group uses the plain or the own/other form; likewise for
    /// edit, delete and publish.
    pub fn synonym<'a>(&self, group: &str, level: &'a str) -> &'a str {
        let Some(levels) = self.table.group(group) else {
            return level;
        };
        if levels.contains(level) {
            return level;
        }
        for base in ["view", "edit", "delete", "publish"] {
            if level == base {
                let other = match base {
                    "view" => "viewother",
                    "edit" => "editother",
                    "delete" => "deleteother",
                    _ => "publishother",
                };
                if levels.contains(other) {
                    return other;
                }
            } else if level.strip_prefix(base).is_some_and(|rest| rest == "own" || rest == "other")
                && levels.contains(base)
            {
                return base;
            }
        }
        level
    }

    fn has_external_implications(&self) -> bool {
        self.groups.iter().any(|group| {
            group.implies.iter().any(|rule| {
                PermissionToken::parse(&rule.when).is_some_and(|when| when.bundle != self.name)
            })
        })
    }

    /// Grant implied levels. Returns whether anything new was granted.
    fn apply_implications(&self, own: &mut BundleRequest, all: &RequestedPermissions) -> bool {
        let mut granted = false;
        for group in &self.groups {
            for rule in &group.implies {
                // Triggers are checked by define_permissions.
                let Some(when) = PermissionToken::parse(&rule.when) else {
                    continue;
                };
                let triggered = if when.bundle == self.name {
                    own.has(when.group, self.synonym(when.group, when.level))
                } else {
                    trigger_forms(when.level)
                        .iter()
                        .any(|level| all.has(when.bundle, when.group, level))
                };
                if triggered && self.is_supported(&group.name, &rule.grant) {
                    let grant = self.synonym(&group.name, &rule.grant).to_string();
                    if own.grant(&group.name, &grant) {
                        granted = true;
                        debug!(
                            bundle = %self.name,
                            group = %group.name,
                            level = %grant,
                            trigger = %rule.when,
                            "Implied level granted"
                        );
                    }
                }
            }
        }
        granted
    }

    fn expand_required(&self, own: &mut BundleRequest) {
        for group in own.group_names() {
            let Some(levels) = self.table.group(&group) else {
                continue;
            };
            let requested: Vec<String> = own.levels(&group).map(<[String]>::to_vec).unwrap_or_default();

            if requested.iter().any(|level| level == FULL) && levels.contains(FULL) {
                own.set_levels(&group, levels.names().map(str::to_string).collect());
                continue;
            }

            for level in &requested {
                for required in required_levels(level) {
                    let required = self.synonym(&group, required);
                    if levels.contains(required) {
                        own.grant(&group, required);
                    }
                }
            }
        }
    }
}

impl PermissionDefinition for StandardDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn define_permissions(&mut self) -> Result<()> {
        let mut table = PermissionTable::new();
        for group in &self.groups {
            if group.preset.is_none() && group.levels.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "{}:{} declares no levels",
                    self.name, group.name
                )));
            }
            for rule in &group.implies {
                if !PermissionToken::parse(&rule.when).is_some_and(|when| when.is_simple()) {
                    return Err(Error::InvalidArgument(format!(
                        "{}:{} implication trigger {} must be formatted as bundle:group:level",
                        self.name, group.name, rule.when
                    )));
                }
            }
            table.add_group(&group.name, group.level_values())?;
        }
        self.table = table;
        Ok(())
    }

    fn permissions(&self) -> &PermissionTable {
        &self.table
    }

    fn is_supported(&self, group: &str, level: &str) -> bool {
        self.table.is_supported(group, self.synonym(group, level))
    }

    fn canonical_level<'a>(&self, group: &str, level: &'a str) -> &'a str {
        self.synonym(group, level)
    }

    fn value(&self, group: &str, level: &str) -> Result<Mask> {
        self.table
            .value(group, self.synonym(group, level))
            .ok_or_else(|| {
                Error::UnknownPermission(format!("{level} is not a level of {}:{group}", self.name))
            })
    }

    fn analyze_permissions(
        &self,
        own: &mut BundleRequest,
        all: &RequestedPermissions,
        second_pass: bool,
    ) -> bool {
        loop {
            self.expand_required(own);
            if !self.apply_implications(own, all) {
                break;
            }
        }
        !second_pass && self.has_external_implications()
    }
}
