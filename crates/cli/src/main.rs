mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::RunArgs;
use output::OutputFormat;

/// kettle - resolve, plan and build declarative build manifests
#[derive(Parser)]
#[command(name = "kettle")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(flatten)]
  run: RunArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Expand a configuration into its ordered requirements
  Compose {
    /// Configuration name
    name: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the build order for one or more targets
  Plan {
    /// Target names, `package:name` references or capabilities
    #[arg(required = true)]
    targets: Vec<String>,

    /// Also compute each target's cache key
    #[arg(long)]
    checksums: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build a target and print its provider record
  Resolve {
    /// Target name, `package:name` reference or capability
    target: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Build one or more targets
  Build {
    /// Target names, `package:name` references or capabilities
    #[arg(required = true)]
    targets: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show host, environment and cache information
  Info {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Compose { name, output } => cmd::cmd_compose(&cli.run, &name, output),
    Commands::Plan {
      targets,
      checksums,
      output,
    } => cmd::cmd_plan(&cli.run, &targets, checksums, output),
    Commands::Resolve { target, output } => cmd::cmd_resolve(&cli.run, &target, output),
    Commands::Build { targets, output } => cmd::cmd_build(&cli.run, &targets, output),
    Commands::Info { output } => cmd::cmd_info(&cli.run, output),
  }
}
