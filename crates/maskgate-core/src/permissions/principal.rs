//! Principals whose stored role masks are evaluated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::compiler::RoleEntry;
use super::mask::Mask;

/// Group name → stored mask for one bundle.
pub type BundleMasks = BTreeMap<String, Mask>;

/// Bundle name → stored group masks of a principal's role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivePermissions {
    bundles: BTreeMap<String, BundleMasks>,
}

impl ActivePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild stored masks from compiled role entries.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a RoleEntry>,
    {
        let mut active = Self::new();
        for entry in entries {
            active.insert(&entry.bundle, &entry.group, entry.mask);
        }
        active
    }

    /// Set the stored mask of `bundle:group`.
    pub fn insert(&mut self, bundle: &str, group: &str, mask: Mask) {
        self.bundles
            .entry(bundle.to_string())
            .or_default()
            .insert(group.to_string(), mask);
    }

    pub fn bundle(&self, bundle: &str) -> Option<&BundleMasks> {
        self.bundles.get(bundle)
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

/// An already-authenticated (or anonymous) subject of authorization.
pub trait Principal: Send + Sync {
    /// Administrators are granted every parseable permission.
    fn is_admin(&self) -> bool;

    /// Anonymous and guest principals are denied every permission.
    fn is_anonymous(&self) -> bool;

    /// Numeric identifier, compared against resource owners. `0` for anonymous.
    fn id(&self) -> i64;

    /// Stored role masks.
    fn active_permissions(&self) -> &ActivePermissions;
}

/// An authenticated user with a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub admin: bool,
    /// Guest accounts are authenticated but treated as anonymous.
    #[serde(default)]
    pub guest: bool,
    #[serde(default)]
    pub permissions: ActivePermissions,
}

impl User {
    pub fn new(id: i64, permissions: ActivePermissions) -> Self {
        Self {
            id,
            admin: false,
            guest: false,
            permissions,
        }
    }

    pub fn admin(id: i64) -> Self {
        Self {
            id,
            admin: true,
            guest: false,
            permissions: ActivePermissions::new(),
        }
    }
}

impl Principal for User {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn is_anonymous(&self) -> bool {
        self.guest
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn active_permissions(&self) -> &ActivePermissions {
        &self.permissions
    }
}

/// Unauthenticated visitor or timed-out session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

static NO_PERMISSIONS: std::sync::LazyLock<ActivePermissions> =
    std::sync::LazyLock::new(ActivePermissions::new);

impl Principal for Anonymous {
    fn is_admin(&self) -> bool {
        false
    }

    fn is_anonymous(&self) -> bool {
        true
    }

    fn id(&self) -> i64 {
        0
    }

    fn active_permissions(&self) -> &ActivePermissions {
        &NO_PERMISSIONS
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn active_permissions_from_entries() {
        let entries = vec![
            RoleEntry {
                bundle: "lead".to_string(),
                group: "leads".to_string(),
                mask: Mask::from_bits(20),
            },
            RoleEntry {
                bundle: "lead".to_string(),
                group: "lists".to_string(),
                mask: Mask::from_bits(4),
            },
        ];
        let active = ActivePermissions::from_entries(&entries);
        let lead = active.bundle("lead").unwrap();
        assert_eq!(lead.get("leads"), Some(&Mask::from_bits(20)));
        assert_eq!(lead.get("lists"), Some(&Mask::from_bits(4)));
        assert!(active.bundle("page").is_none());
    }

    #[test]
    fn anonymous_is_never_admin() {
        assert!(!Anonymous.is_admin());
        assert!(Anonymous.is_anonymous());
        assert_eq!(Anonymous.id(), 0);
        assert!(Anonymous.active_permissions().is_empty());
    }

    #[test]
    fn guest_user_counts_as_anonymous() {
        let guest = User {
            guest: true,
            ..User::new(9, ActivePermissions::new())
        };
        assert!(guest.is_anonymous());
        assert!(!User::admin(1).is_anonymous());
    }
}
