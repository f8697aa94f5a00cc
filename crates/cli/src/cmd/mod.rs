mod build;
mod list;
mod log;
mod show;

pub use build::{BuildOptions, cmd_build};
pub use list::cmd_list;
pub use log::cmd_log;
pub use show::cmd_show;

use std::path::Path;

use anyhow::{Context, Result};

use buildbox_lib::config::BuildConfig;
use buildbox_lib::job::JobId;

fn load_config(path: Option<&Path>) -> Result<BuildConfig> {
  BuildConfig::load(path).context("Failed to load config")
}

fn parse_job_id(id: &str) -> Result<JobId> {
  id.parse().with_context(|| format!("Invalid job id: {}", id))
}
