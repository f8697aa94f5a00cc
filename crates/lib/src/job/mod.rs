//! Build jobs.
//!
//! A [`BuildJob`] is created `Waiting` when a build is requested and leaves
//! that state exactly once, through [`BuildJob::finish`]. Its artifacts live
//! under its own [`JobId`] in the artifact store.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::project::Project;
use crate::target::{BinaryKind, WatchPlatform};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
  #[error("job {id} already finished as {state}")]
  AlreadyFinished { id: JobId, state: JobState },

  #[error("{0} is not a terminal state")]
  NotTerminal(JobState),
}

/// Unique job identity; namespaces the job's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
  pub fn new() -> Self {
    JobId(Uuid::new_v4())
  }
}

impl Default for JobId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl FromStr for JobId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s.trim()).map(JobId)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
  Waiting,
  Succeeded,
  Failed,
}

impl JobState {
  pub fn is_terminal(self) -> bool {
    !matches!(self, JobState::Waiting)
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JobState::Waiting => f.write_str("waiting"),
      JobState::Succeeded => f.write_str("succeeded"),
      JobState::Failed => f.write_str("failed"),
    }
  }
}

/// Component sizes of one platform in the packaged archive.
///
/// Derived from the archive and reconstructable from it at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSizeRecord {
  pub platform: WatchPlatform,
  /// Sum of the components that were found.
  pub total_size: u64,
  pub binary_size: Option<u64>,
  pub resource_size: Option<u64>,
  pub worker_size: Option<u64>,
}

/// A debug map stored for this job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMapRecord {
  pub platform: WatchPlatform,
  pub kind: BinaryKind,
  /// Artifact name the map is stored under.
  pub artifact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildJob {
  pub id: JobId,
  pub project: String,
  pub sdk_version: String,
  pub state: JobState,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub finished_at: Option<DateTime<Utc>>,
  /// Wall-clock time spent in the toolchain, in milliseconds.
  #[serde(default)]
  pub build_time_ms: Option<u64>,
  /// Size of the packaged archive.
  #[serde(default)]
  pub total_size: Option<u64>,
  #[serde(default)]
  pub sizes: Vec<BuildSizeRecord>,
  #[serde(default)]
  pub debug_maps: Vec<DebugMapRecord>,
  /// Names of the artifacts stored under this job.
  #[serde(default)]
  pub artifacts: BTreeSet<String>,
  /// Classified reason for a failed job.
  #[serde(default)]
  pub failure: Option<String>,
}

impl BuildJob {
  pub fn new(project: &Project) -> Self {
    Self {
      id: JobId::new(),
      project: project.name.clone(),
      sdk_version: project.sdk_version.clone(),
      state: JobState::Waiting,
      created_at: Utc::now(),
      finished_at: None,
      build_time_ms: None,
      total_size: None,
      sizes: Vec::new(),
      debug_maps: Vec::new(),
      artifacts: BTreeSet::new(),
      failure: None,
    }
  }

  pub fn is_finished(&self) -> bool {
    self.state.is_terminal()
  }

  /// Move to a terminal state and stamp `finished_at`. Allowed once.
  pub fn finish(&mut self, state: JobState) -> Result<(), JobError> {
    if self.is_finished() {
      return Err(JobError::AlreadyFinished {
        id: self.id,
        state: self.state,
      });
    }
    if !state.is_terminal() {
      return Err(JobError::NotTerminal(state));
    }
    self.state = state;
    self.finished_at = Some(Utc::now());
    Ok(())
  }

  pub fn record_artifact(&mut self, name: &str) {
    self.artifacts.insert(name.to_string());
  }

  pub fn has_artifact(&self, name: &str) -> bool {
    self.artifacts.contains(name)
  }

  pub fn set_build_time(&mut self, elapsed: Duration) {
    self.build_time_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
  }

  /// Time from creation to the terminal transition.
  pub fn run_time(&self) -> Option<Duration> {
    let finished = self.finished_at?;
    (finished - self.created_at).to_std().ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::Flavor;
  use std::collections::BTreeMap;

  fn project() -> Project {
    Project {
      name: "Demo".to_string(),
      app_short_name: "demo".to_string(),
      app_long_name: None,
      app_uuid: "00000000-0000-0000-0000-000000000000".to_string(),
      app_company_name: String::new(),
      app_version_label: "1.0".to_string(),
      app_is_watchface: false,
      app_keys: BTreeMap::new(),
      app_capabilities: vec![],
      app_platforms: None,
      project_type: Flavor::Native,
      sdk_version: "3".to_string(),
      source_files: vec![],
      resources: vec![],
    }
  }

  #[test]
  fn new_job_is_waiting() {
    let job = BuildJob::new(&project());
    assert_eq!(job.state, JobState::Waiting);
    assert!(job.finished_at.is_none());
    assert!(job.run_time().is_none());
  }

  #[test]
  fn finish_is_exactly_once() {
    let mut job = BuildJob::new(&project());
    job.finish(JobState::Failed).unwrap();
    assert!(job.finished_at.is_some());
    let first = job.finished_at;

    let err = job.finish(JobState::Succeeded).unwrap_err();
    assert_eq!(
      err,
      JobError::AlreadyFinished {
        id: job.id,
        state: JobState::Failed
      }
    );
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.finished_at, first);
  }

  #[test]
  fn waiting_is_not_terminal() {
    let mut job = BuildJob::new(&project());
    assert_eq!(job.finish(JobState::Waiting), Err(JobError::NotTerminal(JobState::Waiting)));
    assert!(job.finished_at.is_none());
  }

  #[test]
  fn job_ids_are_unique_and_parse() {
    let a = JobId::new();
    let b = JobId::new();
    assert_ne!(a, b);
    assert_eq!(a.to_string().parse::<JobId>().unwrap(), a);
    assert!("not-a-uuid".parse::<JobId>().is_err());
  }

  #[test]
  fn record_round_trips_through_json() {
    let mut job = BuildJob::new(&project());
    job.record_artifact("build_log.txt");
    job.sizes.push(BuildSizeRecord {
      platform: WatchPlatform::Basalt,
      total_size: 10,
      binary_size: Some(10),
      resource_size: None,
      worker_size: None,
    });
    job.finish(JobState::Succeeded).unwrap();

    let text = serde_json::to_string(&job).unwrap();
    assert!(text.contains("\"state\":\"succeeded\""));
    let back: BuildJob = serde_json::from_str(&text).unwrap();
    assert_eq!(back, job);
  }
}
