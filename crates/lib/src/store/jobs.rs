use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{StoreError, write_atomic};
use crate::job::{BuildJob, JobId};

const JOBS_DIR: &str = "jobs";

/// Job records as `<root>/jobs/<job-id>.json`.
#[derive(Debug, Clone)]
pub struct JobStore {
  base_path: PathBuf,
}

impl JobStore {
  pub fn new(store_root: &Path) -> Self {
    Self {
      base_path: store_root.join(JOBS_DIR),
    }
  }

  fn record_path(&self, id: JobId) -> PathBuf {
    self.base_path.join(format!("{}.json", id))
  }

  fn ensure_dir(&self) -> Result<(), StoreError> {
    fs::create_dir_all(&self.base_path).map_err(|e| StoreError::io(&self.base_path, e))
  }

  /// Record a newly requested job. Fails if the id is already taken.
  pub fn create(&self, job: &BuildJob) -> Result<(), StoreError> {
    if self.record_path(job.id).exists() {
      return Err(StoreError::JobExists(job.id));
    }
    self.save(job)
  }

  /// Write the job record, replacing any previous version.
  pub fn save(&self, job: &BuildJob) -> Result<(), StoreError> {
    self.ensure_dir()?;
    let content = serde_json::to_string_pretty(job).map_err(StoreError::Serialize)?;
    write_atomic(&self.base_path, &self.record_path(job.id), |file| {
      io::Write::write_all(file, content.as_bytes())
    })
  }

  pub fn load(&self, id: JobId) -> Result<BuildJob, StoreError> {
    let path = self.record_path(id);
    let content = fs::read_to_string(&path).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        StoreError::JobNotFound(id)
      } else {
        StoreError::io(&path, e)
      }
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// All job records, oldest first. Unreadable records are skipped.
  pub fn list(&self) -> Result<Vec<BuildJob>, StoreError> {
    let entries = match fs::read_dir(&self.base_path) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(StoreError::io(&self.base_path, e)),
    };

    let mut jobs = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|e| StoreError::io(&self.base_path, e))?;
      let path = entry.path();
      let id = path
        .extension()
        .filter(|ext| *ext == "json")
        .and_then(|_| path.file_stem())
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<JobId>().ok());
      let Some(id) = id else {
        continue;
      };
      match self.load(id) {
        Ok(job) => jobs.push(job),
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
      }
    }

    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(jobs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::JobState;
  use crate::project::{Flavor, Project};
  use std::collections::BTreeMap;
  use tempfile::TempDir;

  fn project(name: &str) -> Project {
    Project {
      name: name.to_string(),
      app_short_name: name.to_lowercase(),
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
  fn create_load_save() {
    let temp = TempDir::new().unwrap();
    let store = JobStore::new(temp.path());
    let mut job = BuildJob::new(&project("Demo"));

    store.create(&job).unwrap();
    assert_eq!(store.load(job.id).unwrap().state, JobState::Waiting);
    assert!(matches!(store.create(&job), Err(StoreError::JobExists(_))));

    job.finish(JobState::Succeeded).unwrap();
    store.save(&job).unwrap();
    let loaded = store.load(job.id).unwrap();
    assert_eq!(loaded.state, JobState::Succeeded);
    assert_eq!(loaded.finished_at, job.finished_at);
  }

  #[test]
  fn load_missing_job() {
    let temp = TempDir::new().unwrap();
    let store = JobStore::new(temp.path());
    let id = JobId::new();
    assert!(matches!(store.load(id), Err(StoreError::JobNotFound(missing)) if missing == id));
  }

  #[test]
  fn list_is_ordered_and_skips_junk() {
    let temp = TempDir::new().unwrap();
    let store = JobStore::new(temp.path());
    assert!(store.list().unwrap().is_empty());

    let first = BuildJob::new(&project("First"));
    let mut second = BuildJob::new(&project("Second"));
    second.created_at = first.created_at + chrono::Duration::seconds(5);
    store.save(&second).unwrap();
    store.save(&first).unwrap();
    std::fs::write(temp.path().join("jobs/notes.txt"), "ignore me").unwrap();
    std::fs::write(temp.path().join(format!("jobs/{}.json", JobId::new())), "{ broken").unwrap();

    let jobs = store.list().unwrap();
    let names: Vec<&str> = jobs.iter().map(|j| j.project.as_str()).collect();
    assert_eq!(names, vec!["First", "Second"]);
  }
}
