use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use maskgate_cli::commands::{
    self, AccessArgs, CheckArgs, CompileArgs, ExistsArgs, ListArgs,
};
use maskgate_core::config::load_config;
use maskgate_core::tracing_init::init_tracing;

/// Bitwise role-based permission tool.
#[derive(Debug, Parser)]
#[command(name = "maskgate", version, about)]
struct Cli {
    /// Bundle catalog (TOML or JSON)
    #[arg(long, global = true, env = "MASKGATE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Directory holding `.maskgate/settings.json` (default: current directory)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every bundle's groups and levels
    Catalog(ListArgs),
    /// Compile requested levels into role masks
    Compile(CompileArgs),
    /// Evaluate permissions for a principal
    Check(CheckArgs),
    /// Report whether permissions are defined
    Exists(ExistsArgs),
    /// Decide access to an owned resource
    Access(AccessArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut config = load_config(Some(&project_dir))?;
    if cli.log_json {
        config.logging.json = true;
    }
    init_tracing(&config.logging);

    let catalog = cli
        .catalog
        .context("no catalog given; pass --catalog or set MASKGATE_CATALOG")?;
    let registry = Arc::new(commands::load_registry(&catalog, &config)?);

    let output = match cli.command {
        Commands::Catalog(ref args) => commands::catalog(registry, args)?,
        Commands::Compile(ref args) => commands::compile(&registry, &config, args)?,
        Commands::Check(ref args) => commands::check(registry, &config, args)?,
        Commands::Exists(ref args) => commands::exists(registry, args)?,
        Commands::Access(ref args) => commands::access(registry, &config, args)?,
    };
    print_json(&output)
}

#[allow(clippy::print_stdout)]
fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
