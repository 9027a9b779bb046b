//! Own-versus-other access to owned resources.

use super::evaluator::{AccessContext, MatchMode};
use super::principal::{Principal, User};
use crate::error::Result;

/// A permission argument: already resolved, or a token to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionArg<'a> {
    Resolved(bool),
    Token(&'a str),
}

impl From<bool> for PermissionArg<'_> {
    fn from(granted: bool) -> Self {
        Self::Resolved(granted)
    }
}

impl<'a> From<&'a str> for PermissionArg<'a> {
    fn from(token: &'a str) -> Self {
        Self::Token(token)
    }
}

impl<'a> From<&'a String> for PermissionArg<'a> {
    fn from(token: &'a String) -> Self {
        Self::Token(token)
    }
}

/// Owner of a resource. Id `0` means no specific owner (e.g. a new resource).
#[derive(Clone, Copy)]
pub enum Owner<'a> {
    Id(i64),
    Principal(&'a dyn Principal),
}

impl Owner<'_> {
    pub fn id(&self) -> i64 {
        match self {
            Self::Id(id) => *id,
            Self::Principal(principal) => principal.id(),
        }
    }
}

impl From<i64> for Owner<'_> {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a User> for Owner<'a> {
    fn from(user: &'a User) -> Self {
        Self::Principal(user)
    }
}

impl<'a> From<&'a dyn Principal> for Owner<'a> {
    fn from(principal: &'a dyn Principal) -> Self {
        Self::Principal(principal)
    }
}

impl AccessContext {
    /// Whether the context's principal may access a resource owned by `owner`,
    /// given the permission for own resources and the one for everyone else's.
    ///
    /// Anonymous principals are always denied. Unowned resources (`0`) need
    /// `other`; the principal's own resources need `own`; anyone else's need
    /// `other`.
    pub fn has_entity_access<'a>(
        &mut self,
        own: impl Into<PermissionArg<'a>>,
        other: impl Into<PermissionArg<'a>>,
        owner: impl Into<Owner<'a>>,
    ) -> Result<bool> {
        if self.is_anonymous() {
            return Ok(false);
        }

        let owner_id = owner.into().id();
        let (own, other) = match (own.into(), other.into()) {
            (PermissionArg::Token(own), PermissionArg::Token(other)) => {
                let results = self.results(&[own, other])?;
                (
                    results.get(own).copied().unwrap_or(false),
                    results.get(other).copied().unwrap_or(false),
                )
            }
            (own, other) => (self.resolve_arg(own)?, self.resolve_arg(other)?),
        };

        let current_id = self.principal().id();
        Ok(if owner_id == 0 {
            other
        } else if owner_id == current_id {
            own
        } else {
            other
        })
    }

    fn resolve_arg(&mut self, arg: PermissionArg<'_>) -> Result<bool> {
        match arg {
            PermissionArg::Resolved(granted) => Ok(granted),
            PermissionArg::Token(token) => Ok(self.is_granted(&[token], MatchMode::All)?.is_granted()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::permissions::mask::Mask;
    use crate::permissions::principal::{ActivePermissions, Anonymous};
    use crate::permissions::registry::PermissionRegistry;
    use crate::permissions::standard::{GroupSpec, Preset, StandardDefinition};

    fn context(principal: Arc<dyn Principal>) -> AccessContext {
        let registry = PermissionRegistry::empty();
        registry.register(Box::new(StandardDefinition::new(
            "lead",
            "lead.permissions",
            vec![GroupSpec::preset("leads", Preset::Extended)],
        )));
        AccessContext::new(Arc::new(registry), principal)
    }

    fn user(id: i64, mask: u32) -> Arc<dyn Principal> {
        let mut active = ActivePermissions::new();
        active.insert("lead", "leads", Mask::from_bits(mask));
        Arc::new(User::new(id, active))
    }

    #[test]
    fn unowned_resource_needs_other() {
        let mut ctx = context(user(42, 0));
        assert!(ctx.has_entity_access(false, true, 0_i64).unwrap());
        assert!(!ctx.has_entity_access(true, false, 0_i64).unwrap());
    }

    #[test]
    fn own_resource_needs_own() {
        let mut ctx = context(user(42, 0));
        assert!(ctx.has_entity_access(true, false, 42_i64).unwrap());
        assert!(!ctx.has_entity_access(false, true, 42_i64).unwrap());
    }

    #[test]
    fn foreign_resource_needs_other() {
        let mut ctx = context(user(7, 0));
        assert!(!ctx.has_entity_access(false, false, 42_i64).unwrap());
        assert!(!ctx.has_entity_access(true, false, 42_i64).unwrap());
        assert!(ctx.has_entity_access(false, true, 42_i64).unwrap());
    }

    #[test]
    fn tokens_are_evaluated() {
        // viewown only
        let mut ctx = context(user(7, 2));
        assert!(ctx.has_entity_access("lead:leads:viewown", "lead:leads:viewother", 7_i64).unwrap());
        assert!(!ctx.has_entity_access("lead:leads:viewown", "lead:leads:viewother", 9_i64).unwrap());
        assert!(ctx.has_entity_access("lead:leads:viewown", false, 7_i64).unwrap());
    }

    #[test]
    fn owner_given_as_user() {
        let mut ctx = context(user(7, 4));
        let owner = User::new(9, ActivePermissions::new());
        assert!(ctx.has_entity_access("lead:leads:viewown", "lead:leads:viewother", &owner).unwrap());
    }

    #[test]
    fn anonymous_is_denied() {
        let mut ctx = context(Arc::new(Anonymous));
        assert!(!ctx.has_entity_access(true, true, 0_i64).unwrap());
    }
}
