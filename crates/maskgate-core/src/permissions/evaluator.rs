//! Query-time permission evaluation.
//!
//! An [`AccessContext`] binds a shared [`PermissionRegistry`] to one
//! principal and owns the decision cache for that authorization context
//! (one request, one batch job). Create a new context, or call
//! [`AccessContext::clear`], whenever the principal changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::definition::PermissionTable;
use super::principal::Principal;
use super::registry::PermissionRegistry;
use super::token::PermissionToken;
use super::translate::{BAD_FORMAT, DefaultMessages, MODE_NOT_FOUND, NOT_FOUND, Translator};
use crate::error::{Error, Result};

/// How per-token results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Granted only if every token is granted.
    All,
    /// Granted if any token is granted.
    Any,
    /// Return every token's result.
    AllResults,
}

impl MatchMode {
    /// Parse a mode name. Accepts `all`/`MATCH_ALL`, `any`/`MATCH_ONE` and
    /// `all_results`/`RETURN_ARRAY`.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "all" | "MATCH_ALL" => Some(Self::All),
            "any" | "MATCH_ONE" => Some(Self::Any),
            "all_results" | "RETURN_ARRAY" => Some(Self::AllResults),
            _ => None,
        }
    }
}

/// Outcome of [`AccessContext::is_granted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Combined result for `All` and `Any`.
    Granted(bool),
    /// Per-token results for `AllResults`.
    Results(BTreeMap<String, bool>),
}

impl Decision {
    /// Combined result. Per-token results count as granted only if all are.
    pub fn is_granted(&self) -> bool {
        match self {
            Self::Granted(granted) => *granted,
            Self::Results(results) => results.values().all(|granted| *granted),
        }
    }

    pub fn into_results(self) -> Option<BTreeMap<String, bool>> {
        match self {
            Self::Results(results) => Some(results),
            Self::Granted(_) => None,
        }
    }
}

/// Options for a single [`AccessContext::evaluate`] call.
#[derive(Clone, Copy, Default)]
pub struct EvalOptions<'p> {
    /// Evaluate for this principal instead of the context's. Such decisions
    /// bypass the decision cache.
    pub principal: Option<&'p dyn Principal>,
    /// Override the context's unknown-permission policy.
    pub allow_unknown: Option<bool>,
}

/// Authorization context for one principal.
pub struct AccessContext {
    registry: Arc<PermissionRegistry>,
    principal: Arc<dyn Principal>,
    translator: Arc<dyn Translator>,
    allow_unknown: bool,
    decisions: HashMap<String, bool>,
    checked: HashMap<String, bool>,
}

impl AccessContext {
    pub fn new(registry: Arc<PermissionRegistry>, principal: Arc<dyn Principal>) -> Self {
        Self {
            registry,
            principal,
            translator: Arc::new(DefaultMessages::default()),
            allow_unknown: false,
            decisions: HashMap::new(),
            checked: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Resolve unknown permissions to denied instead of failing.
    #[must_use]
    pub const fn with_allow_unknown(mut self, allow_unknown: bool) -> Self {
        self.allow_unknown = allow_unknown;
        self
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn principal(&self) -> &dyn Principal {
        self.principal.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_admin()
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_anonymous()
    }

    /// Drop memoized decisions.
    pub fn clear(&mut self) {
        self.decisions.clear();
        self.checked.clear();
    }

    /// Evaluate tokens for the context's principal.
    pub fn is_granted<S: AsRef<str>>(&mut self, tokens: &[S], mode: MatchMode) -> Result<Decision> {
        self.evaluate(tokens, mode, EvalOptions::default())
    }

    /// Evaluate tokens with a mode given by name.
    pub fn is_granted_mode<S: AsRef<str>>(&mut self, tokens: &[S], mode: &str) -> Result<Decision> {
        let mode = self.parse_mode(mode)?;
        self.is_granted(tokens, mode)
    }

    /// Evaluate a single token.
    pub fn granted(&mut self, token: &str) -> Result<bool> {
        Ok(self.is_granted(&[token], MatchMode::All)?.is_granted())
    }

    /// Per-token results.
    pub fn results<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<BTreeMap<String, bool>> {
        Ok(self
            .is_granted(tokens, MatchMode::AllResults)?
            .into_results()
            .unwrap_or_default())
    }

    pub fn parse_mode(&self, mode: &str) -> Result<MatchMode> {
        MatchMode::parse(mode).ok_or_else(|| {
            Error::InvalidMode(self.translator.translate(MODE_NOT_FOUND, &[("mode", mode)]))
        })
    }

    /// Evaluate tokens and combine the results according to `mode`.
    pub fn evaluate<S: AsRef<str>>(
        &mut self,
        tokens: &[S],
        mode: MatchMode,
        options: EvalOptions<'_>,
    ) -> Result<Decision> {
        let allow_unknown = options.allow_unknown.unwrap_or(self.allow_unknown);
        let mut results = BTreeMap::new();

        for token in tokens {
            let token = token.as_ref();
            let granted = if let Some(principal) = options.principal {
                self.resolve(token, principal, allow_unknown)?
            } else if let Some(&cached) = self.decisions.get(token) {
                debug!(permission = token, granted = cached, "Permission decision cache hit");
                cached
            } else {
                let granted = self.resolve(token, self.principal.as_ref(), allow_unknown)?;
                self.decisions.insert(token.to_string(), granted);
                granted
            };
            results.insert(token.to_string(), granted);
        }

        Ok(match mode {
            MatchMode::All => Decision::Granted(results.values().all(|granted| *granted)),
            MatchMode::Any => Decision::Granted(results.values().any(|granted| *granted)),
            MatchMode::AllResults => Decision::Results(results),
        })
    }

    fn resolve(&self, token: &str, principal: &dyn Principal, allow_unknown: bool) -> Result<bool> {
        let parsed = PermissionToken::parse(token).ok_or_else(|| {
            Error::MalformedPermission(
                self.translator
                    .translate(BAD_FORMAT, &[("permission", token)]),
            )
        })?;

        if principal.is_admin() {
            return Ok(true);
        }

        let definition = match self.registry.get(parsed.bundle) {
            Ok(definition) => definition,
            Err(e) if allow_unknown => {
                debug!(permission = token, error = %e, "Unknown bundle resolved to denied");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if !definition.is_supported(parsed.group, parsed.level) {
            if allow_unknown {
                return Ok(false);
            }
            return Err(Error::UnknownPermission(
                self.translator.translate(NOT_FOUND, &[("permission", token)]),
            ));
        }

        if principal.is_anonymous() {
            return Ok(false);
        }

        let Some(masks) = principal.active_permissions().bundle(parsed.bundle) else {
            return Ok(false);
        };

        Ok(definition.is_granted(masks, parsed.group, parsed.level))
    }

    /// Whether each token names a supported permission. Malformed tokens and
    /// unknown bundles yield `false`.
    pub fn check_permission_exists<S: AsRef<str>>(&mut self, tokens: &[S]) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for token in tokens {
            let token = token.as_ref();
            let exists = if let Some(&cached) = self.checked.get(token) {
                cached
            } else {
                let exists = PermissionToken::parse(token)
                    .filter(PermissionToken::is_simple)
                    .and_then(|parsed| {
                        self.registry
                            .find(parsed.bundle)
                            .map(|definition| definition.is_supported(parsed.group, parsed.level))
                    })
                    .unwrap_or(false);
                self.checked.insert(token.to_string(), exists);
                exists
            };
            results.insert(token.to_string(), exists);
        }
        results
    }

    pub fn permission_exists(&mut self, token: &str) -> bool {
        self.check_permission_exists(&[token])
            .get(token)
            .copied()
            .unwrap_or(false)
    }

    /// Permission tables of every bundle.
    pub fn all_permissions(&self) -> BTreeMap<String, PermissionTable> {
        self.registry
            .all()
            .into_iter()
            .map(|definition| (definition.name().to_string(), definition.permissions().clone()))
            .collect()
    }

    /// Level names of every group of every bundle, as shown in UI listings.
    pub fn all_permission_levels(&self) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let mut listing = BTreeMap::new();
        for definition in self.registry.all() {
            let mut groups = BTreeMap::new();
            for (group, levels) in definition.permissions().groups() {
                let mut names: Vec<String> = levels.names().map(str::to_string).collect();
                definition.ui_levels(group, &mut names);
                groups.insert(group.to_string(), names);
            }
            listing.insert(definition.name().to_string(), groups);
        }
        listing
    }
}

impl fmt::Debug for AccessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessContext")
            .field("principal_id", &self.principal.id())
            .field("allow_unknown", &self.allow_unknown)
            .field("decisions", &self.decisions.len())
            .finish_non_exhaustive()
    }
}
