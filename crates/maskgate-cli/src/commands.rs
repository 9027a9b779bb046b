//! Subcommand arguments and handlers. Every handler returns the JSON
//! document printed by the binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::{Value, json};
use tracing::{debug, info};

use maskgate_core::config::Config;
use maskgate_core::permissions::{
    AccessContext, ActivePermissions, Anonymous, CatalogConfig, Decision, DefinitionFactories,
    PermissionArg, PermissionCompiler, PermissionRegistry, Principal, RoleEntry, User,
};

/// Build the registry described by a catalog file.
pub fn load_registry(catalog: &Path, config: &Config) -> Result<PermissionRegistry> {
    let catalog_config = CatalogConfig::load(catalog)
        .with_context(|| format!("failed to load catalog {}", catalog.display()))?;
    let registry = catalog_config.into_registry(config.params.clone(), DefinitionFactories::new())?;
    info!(catalog = %catalog.display(), "Loaded permission catalog");
    Ok(registry)
}

/// Arguments for the `catalog` subcommand.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// List level names as shown in role editors instead of bit values
    #[arg(long)]
    pub ui: bool,
}

pub fn catalog(registry: Arc<PermissionRegistry>, args: &ListArgs) -> Result<Value> {
    let ctx = AccessContext::new(registry, Arc::new(Anonymous));
    if args.ui {
        Ok(serde_json::to_value(ctx.all_permission_levels())?)
    } else {
        Ok(serde_json::to_value(ctx.all_permissions())?)
    }
}

/// Arguments for the `compile` subcommand.
#[derive(Debug, Args)]
pub struct CompileArgs {
    /// Requested levels, e.g. `lead:leads=viewown,editown` (repeatable)
    #[arg(long = "request", value_name = "BUNDLE:GROUP=LEVELS", required = true)]
    pub requests: Vec<String>,

    /// Maximum analysis passes (default: from settings)
    #[arg(long)]
    pub max_passes: Option<u32>,
}

pub fn compile(registry: &PermissionRegistry, config: &Config, args: &CompileArgs) -> Result<Value> {
    let requests = args
        .requests
        .iter()
        .map(|raw| parse_request(raw))
        .collect::<Result<Vec<_>>>()?;
    let max_passes = args
        .max_passes
        .unwrap_or(config.evaluator.max_analysis_passes);
    let entries = PermissionCompiler::new(registry)
        .with_max_passes(max_passes)
        .compile(requests)?;
    Ok(serde_json::to_value(entries)?)
}

/// Split `bundle:group=level,level` into its key and levels.
fn parse_request(raw: &str) -> Result<(String, Vec<String>)> {
    let Some((key, levels)) = raw.split_once('=') else {
        bail!("request {raw} must be formatted as bundle:group=level,level");
    };
    let levels = levels
        .split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
        .collect();
    Ok((key.trim().to_string(), levels))
}

/// Who permissions are evaluated for.
#[derive(Debug, Args)]
pub struct PrincipalArgs {
    /// Compiled role entries (JSON output of `compile`)
    #[arg(long)]
    pub role: Option<PathBuf>,

    /// Evaluate as an administrator
    #[arg(long, conflicts_with = "anonymous")]
    pub admin: bool,

    /// Evaluate as an anonymous visitor
    #[arg(long, conflicts_with = "role")]
    pub anonymous: bool,

    /// User id compared against resource owners
    #[arg(long, default_value_t = 1)]
    pub user_id: i64,

    /// Resolve unknown permissions to denied instead of failing
    #[arg(long)]
    pub allow_unknown: bool,
}

impl PrincipalArgs {
    fn principal(&self) -> Result<Arc<dyn Principal>> {
        if self.anonymous {
            return Ok(Arc::new(Anonymous));
        }
        if self.admin {
            return Ok(Arc::new(User::admin(self.user_id)));
        }
        let permissions = match &self.role {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read role {}", path.display()))?;
                let entries: Vec<RoleEntry> = serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse role {}", path.display()))?;
                debug!(entries = entries.len(), "Loaded role entries");
                ActivePermissions::from_entries(&entries)
            }
            None => ActivePermissions::new(),
        };
        Ok(Arc::new(User::new(self.user_id, permissions)))
    }

    fn context(&self, registry: Arc<PermissionRegistry>, config: &Config) -> Result<AccessContext> {
        Ok(AccessContext::new(registry, self.principal()?)
            .with_allow_unknown(self.allow_unknown || config.evaluator.allow_unknown))
    }
}

/// Arguments for the `check` subcommand.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub principal: PrincipalArgs,

    /// How results combine: all, any or all_results
    #[arg(long, default_value = "all")]
    pub mode: String,

    /// Permissions as `bundle:group:level`
    #[arg(required = true)]
    pub tokens: Vec<String>,
}

pub fn check(registry: Arc<PermissionRegistry>, config: &Config, args: &CheckArgs) -> Result<Value> {
    let mut ctx = args.principal.context(registry, config)?;
    Ok(match ctx.is_granted_mode(&args.tokens, &args.mode)? {
        Decision::Granted(granted) => json!({ "granted": granted }),
        Decision::Results(results) => json!({ "results": results }),
    })
}

/// Arguments for the `exists` subcommand.
#[derive(Debug, Args)]
pub struct ExistsArgs {
    /// Permissions as `bundle:group:level`
    #[arg(required = true)]
    pub tokens: Vec<String>,
}

pub fn exists(registry: Arc<PermissionRegistry>, args: &ExistsArgs) -> Result<Value> {
    let mut ctx = AccessContext::new(registry, Arc::new(Anonymous));
    Ok(serde_json::to_value(ctx.check_permission_exists(&args.tokens))?)
}

/// Arguments for the `access` subcommand.
#[derive(Debug, Args)]
pub struct AccessArgs {
    #[command(flatten)]
    pub principal: PrincipalArgs,

    /// Permission for the principal's own resources (token, `true` or `false`)
    #[arg(long)]
    pub own: String,

    /// Permission for everyone else's resources (token, `true` or `false`)
    #[arg(long)]
    pub other: String,

    /// Owner id of the resource; 0 for unowned
    #[arg(long, default_value_t = 0)]
    pub owner: i64,
}

pub fn access(registry: Arc<PermissionRegistry>, config: &Config, args: &AccessArgs) -> Result<Value> {
    let mut ctx = args.principal.context(registry, config)?;
    let granted = ctx.has_entity_access(
        permission_arg(&args.own),
        permission_arg(&args.other),
        args.owner,
    )?;
    Ok(json!({ "granted": granted }))
}

fn permission_arg(raw: &str) -> PermissionArg<'_> {
    match raw {
        "true" => PermissionArg::Resolved(true),
        "false" => PermissionArg::Resolved(false),
        token => PermissionArg::Token(token),
    }
}
