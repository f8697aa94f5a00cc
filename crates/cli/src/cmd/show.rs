//! Show command implementation.
//!
//! Displays a job record: state, timings, sizes per platform and stored artifacts.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use buildbox_lib::job::BuildJob;
use buildbox_lib::store::JobStore;

use super::{load_config, parse_job_id};
use crate::output::{
  self, OutputFormat, format_bytes, format_duration, format_size_record, print_json, print_stat, print_status,
};

pub fn cmd_show(id: &str, config_path: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;
  let id = parse_job_id(id)?;

  let job = JobStore::new(&config.store_root)
    .load(id)
    .with_context(|| format!("Failed to load job {}", id))?;

  if output.is_json() {
    return print_json(&job);
  }
  print_job(&job);
  Ok(())
}

fn print_job(job: &BuildJob) {
  print_status(job.state, &format!("Job {} ({})", job.id, job.state));
  print_stat("Project", &job.project);
  print_stat("SDK", &job.sdk_version);
  print_stat("Created", &job.created_at.to_rfc3339());
  if let Some(finished_at) = job.finished_at {
    print_stat("Finished", &finished_at.to_rfc3339());
  }
  if let Some(ms) = job.build_time_ms {
    print_stat("Build time", &format_duration(Duration::from_millis(ms)));
  }
  if let Some(size) = job.total_size {
    print_stat("Package", &format_bytes(size));
  }
  if let Some(failure) = &job.failure {
    print_stat("Failure", failure);
  }

  if !job.sizes.is_empty() {
    println!();
    println!("Sizes:");
    for record in &job.sizes {
      println!("  {} {}", output::symbols::INFO, format_size_record(record));
    }
  }

  if !job.artifacts.is_empty() {
    println!();
    println!("Artifacts:");
    for name in &job.artifacts {
      println!("  {} {}/{}", output::symbols::INFO, job.id, name);
    }
  }
}
