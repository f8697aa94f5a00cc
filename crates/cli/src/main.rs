mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::BuildOptions;
use crate::output::OutputFormat;

/// buildbox - sandboxed firmware builds for watch projects
#[derive(Parser)]
#[command(name = "buildbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: <config dir>/buildbox/config.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Output format
  #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build one or more project descriptors
  Build {
    /// Project descriptor files (JSON)
    #[arg(required = true)]
    projects: Vec<PathBuf>,

    /// Leave build directories behind for inspection
    #[arg(long)]
    keep_workspace: bool,

    /// Maximum number of concurrent builds
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Wall-clock limit per build (e.g., "90s", "2m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
  },

  /// Show a job record
  Show {
    /// Job ID
    job: String,
  },

  /// Print a job's build log
  Log {
    /// Job ID
    job: String,
  },

  /// List job records
  List {
    /// Only jobs created within this duration (e.g., "1h", "7d")
    #[arg(long, value_parser = humantime::parse_duration)]
    since: Option<Duration>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();
  let config = cli.config.as_deref();

  match cli.command {
    Commands::Build {
      projects,
      keep_workspace,
      parallelism,
      timeout,
    } => {
      let options = BuildOptions {
        keep_workspace,
        parallelism,
        timeout,
      };
      let all_succeeded = cmd::cmd_build(&projects, &options, config, cli.output)?;
      if !all_succeeded {
        std::process::exit(1);
      }
      Ok(())
    }
    Commands::Show { job } => cmd::cmd_show(&job, config, cli.output),
    Commands::Log { job } => cmd::cmd_log(&job, config),
    Commands::List { since } => cmd::cmd_list(since, config, cli.output),
  }
}
