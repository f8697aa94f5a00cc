//! Implementation of the `buildbox build` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use buildbox_lib::job::{BuildJob, JobState};
use buildbox_lib::pipeline::Pipeline;
use buildbox_lib::project::Project;
use buildbox_lib::worker::run_batch;

use super::load_config;
use crate::output::{OutputFormat, format_bytes, format_duration, print_json, print_stat, print_status};

/// Command-line overrides for the loaded config.
#[derive(Debug, Default)]
pub struct BuildOptions {
  pub keep_workspace: bool,
  pub parallelism: Option<usize>,
  pub timeout: Option<Duration>,
}

/// Build every project descriptor in `projects`.
///
/// Returns whether all jobs succeeded. Project descriptors are loaded up front
/// so a typo fails the command before any job is queued.
pub fn cmd_build(
  projects: &[PathBuf],
  options: &BuildOptions,
  config_path: Option<&Path>,
  output: OutputFormat,
) -> Result<bool> {
  let start = Instant::now();

  let mut config = load_config(config_path)?;
  if options.keep_workspace {
    config.keep_workspaces = true;
  }
  if let Some(parallelism) = options.parallelism {
    config.parallelism = parallelism;
  }
  if let Some(timeout) = options.timeout {
    config.limits.wall_timeout_seconds = Some(timeout.as_secs().max(1));
  }
  let parallelism = config.parallelism();

  let loaded = projects
    .iter()
    .map(|path| Project::load(path).with_context(|| format!("Failed to load project {}", path.display())))
    .collect::<Result<Vec<_>>>()?;

  let pipeline = Arc::new(Pipeline::new(config));
  let mut requests = Vec::with_capacity(loaded.len());
  for project in loaded {
    let job = pipeline.enqueue(&project).context("Failed to queue build")?;
    requests.push((job, project));
  }

  info!(jobs = requests.len(), parallelism, "running builds");
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let finished = rt.block_on(run_batch(Arc::clone(&pipeline), requests, parallelism));
  let all_succeeded = finished.iter().all(|job| job.state == JobState::Succeeded);

  if output.is_json() {
    print_json(&finished)?;
  } else {
    for job in &finished {
      print_job(job);
    }
    println!();
    let failed = finished.iter().filter(|job| job.state != JobState::Succeeded).count();
    print_stat("Jobs", &finished.len().to_string());
    print_stat("Failed", &failed.to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(all_succeeded)
}

fn print_job(job: &BuildJob) {
  let message = match job.state {
    JobState::Succeeded => format!("{} built ({})", job.project, job.id),
    _ => format!(
      "{} failed ({}): {}",
      job.project,
      job.id,
      job.failure.as_deref().unwrap_or("unknown error")
    ),
  };
  print_status(job.state, &message);
  if let Some(size) = job.total_size {
    print_stat("Package", &format_bytes(size));
  }
  if let Some(ms) = job.build_time_ms {
    print_stat("Build time", &format_duration(Duration::from_millis(ms)));
  }
}
