use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use buildbox_lib::consts::BUILD_LOG_ARTIFACT;
use buildbox_lib::store::{ArtifactStore, LocalArtifactStore};

use super::{load_config, parse_job_id};

/// Print the stored build log of a job to stdout, byte for byte.
pub fn cmd_log(id: &str, config_path: Option<&Path>) -> Result<()> {
  let config = load_config(config_path)?;
  let id = parse_job_id(id)?;

  let store = LocalArtifactStore::new(&config.store_root);
  let log = store
    .get(id, BUILD_LOG_ARTIFACT)
    .with_context(|| format!("No build log for job {}", id))?;

  std::io::stdout().write_all(&log).context("Failed to write log")?;
  Ok(())
}
