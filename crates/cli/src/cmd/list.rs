use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use owo_colors::Stream;

use buildbox_lib::job::BuildJob;
use buildbox_lib::store::JobStore;

use super::load_config;
use crate::output::{OutputFormat, print_info, print_json, state_symbol};

pub fn cmd_list(since: Option<Duration>, config_path: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;
  let mut jobs = JobStore::new(&config.store_root)
    .list()
    .context("Failed to list jobs")?;

  if let Some(cutoff) = since.and_then(cutoff) {
    jobs.retain(|job| job.created_at >= cutoff);
  }

  if output.is_json() {
    return print_json(&jobs);
  }
  if jobs.is_empty() {
    print_info("No jobs found.");
    return Ok(());
  }
  for job in &jobs {
    print_row(job);
  }
  Ok(())
}

/// Oldest creation time `since` admits; `None` when it reaches past any representable date.
fn cutoff(since: Duration) -> Option<DateTime<Utc>> {
  let window = chrono::Duration::from_std(since).ok()?;
  Utc::now().checked_sub_signed(window)
}

fn print_row(job: &BuildJob) {
  println!(
    "{} {}  {:<9} {}  {}",
    state_symbol(job.state, Stream::Stdout),
    job.id,
    job.state.to_string(),
    job.created_at.format("%Y-%m-%d %H:%M:%S"),
    job.project
  );
}
