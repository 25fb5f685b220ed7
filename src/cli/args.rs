//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - Reproducible, cached, sandboxed build-artifact optimizer
///
/// Runs an opaque compile-and-optimize pipeline inside a container sandbox
/// with persistent cache volumes and per-cache build serialization.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build optimized artifacts from a source tree
    Build(BuildArgs),

    /// Ensure the optimizer environment image exists
    Provision(ProvisionArgs),

    /// Generate protocol bindings from interface definitions
    Codegen(CodegenArgs),

    /// Manage cache volumes
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Workflow mode for the build command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Bind-mount the source tree into the sandbox
    Mounted,
    /// Copy source in and artifacts out (for hosts without bind mounts)
    Copy,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Source tree to build (defaults to current directory)
    pub path: Option<PathBuf>,

    /// Workflow mode
    #[arg(long, value_enum, default_value_t = ModeArg::Mounted)]
    pub mode: ModeArg,

    /// Destination for extracted artifacts (copy mode only;
    /// defaults to <path>/artifacts)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Bound the wait for the build lock in seconds (0 = wait indefinitely)
    #[arg(long)]
    pub lock_wait: Option<u64>,
}

/// Arguments for the provision command
#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    /// Rebuild the environment even if it already exists
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the codegen command
#[derive(Parser, Debug)]
pub struct CodegenArgs {
    /// Directory holding the interface definitions
    pub spec_dir: PathBuf,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Cache action
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List kiln cache volumes
    Ls,
    /// Remove a cache volume by name
    Rm {
        /// Volume name (see `kiln cache ls`)
        name: String,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}
