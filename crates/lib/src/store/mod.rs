//! Durable job output.
//!
//! # Storage Layout
//!
//! ```text
//! {store_root}/
//! ├── artifacts/
//! │   └── <job-id>/
//! │       ├── build_log.txt
//! │       ├── watchface.pbw
//! │       └── <platform>_debug_info.json
//! └── jobs/
//!     └── <job-id>.json
//! ```
//!
//! Artifacts are addressed as `<job-id>/<name>`, so two jobs never write the
//! same path. All writes go to a temporary file that is renamed into place.

mod jobs;

pub use jobs::JobStore;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::job::JobId;

const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("invalid artifact name: {0:?}")]
  InvalidName(String),

  #[error("artifact {key} not found")]
  ArtifactNotFound { key: String },

  #[error("job {0} not found")]
  JobNotFound(JobId),

  #[error("job {0} already exists")]
  JobExists(JobId),

  #[error("store I/O failed at {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize job record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to parse job record {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

impl StoreError {
  fn io(path: &Path, source: io::Error) -> Self {
    StoreError::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

/// Artifact names are single path components.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
  let invalid = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) || name.contains('\0');
  if invalid {
    return Err(StoreError::InvalidName(name.to_string()));
  }
  Ok(())
}

/// Blob storage for job artifacts, namespaced by job identity.
pub trait ArtifactStore: Send + Sync {
  fn put_bytes(&self, job: JobId, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

  fn put_file(&self, job: JobId, name: &str, source: &Path) -> Result<(), StoreError>;

  fn get(&self, job: JobId, name: &str) -> Result<Vec<u8>, StoreError>;

  fn exists(&self, job: JobId, name: &str) -> bool;

  /// Backend-independent address of an artifact.
  fn key(&self, job: JobId, name: &str) -> Result<String, StoreError> {
    validate_name(name)?;
    Ok(format!("{}/{}", job, name))
  }
}

/// Artifacts as plain files under `<root>/artifacts/<job-id>/`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
  root: PathBuf,
}

impl LocalArtifactStore {
  /// `store_root` is the store's top level; artifacts go in its `artifacts/` subdirectory.
  pub fn new(store_root: &Path) -> Self {
    Self {
      root: store_root.join(ARTIFACTS_DIR),
    }
  }

  pub fn path_for(&self, job: JobId, name: &str) -> Result<PathBuf, StoreError> {
    validate_name(name)?;
    Ok(self.root.join(job.to_string()).join(name))
  }

  fn job_dir(&self, job: JobId) -> Result<PathBuf, StoreError> {
    let dir = self.root.join(job.to_string());
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    Ok(dir)
  }
}

impl ArtifactStore for LocalArtifactStore {
  fn put_bytes(&self, job: JobId, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let dest = self.path_for(job, name)?;
    let dir = self.job_dir(job)?;
    write_atomic(&dir, &dest, |file| file.write_all(bytes))?;
    debug!(job = %job, artifact = name, bytes = bytes.len(), "stored artifact");
    Ok(())
  }

  fn put_file(&self, job: JobId, name: &str, source: &Path) -> Result<(), StoreError> {
    let dest = self.path_for(job, name)?;
    let dir = self.job_dir(job)?;
    let mut input = fs::File::open(source).map_err(|e| StoreError::io(source, e))?;
    write_atomic(&dir, &dest, |file| io::copy(&mut input, file).map(|_| ()))?;
    debug!(job = %job, artifact = name, source = %source.display(), "stored artifact");
    Ok(())
  }

  fn get(&self, job: JobId, name: &str) -> Result<Vec<u8>, StoreError> {
    let path = self.path_for(job, name)?;
    fs::read(&path).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        StoreError::ArtifactNotFound {
          key: format!("{}/{}", job, name),
        }
      } else {
        StoreError::io(&path, e)
      }
    })
  }

  fn exists(&self, job: JobId, name: &str) -> bool {
    self.path_for(job, name).is_ok_and(|p| p.is_file())
  }
}

/// Write to a temporary file in `dir` and rename it over `dest`.
pub(crate) fn write_atomic(
  dir: &Path,
  dest: &Path,
  fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> Result<(), StoreError> {
  let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
  fill(tmp.as_file_mut()).map_err(|e| StoreError::io(dest, e))?;
  tmp.as_file_mut().flush().map_err(|e| StoreError::io(dest, e))?;
  tmp.persist(dest).map_err(|e| StoreError::io(dest, e.error))?;
  Ok(())
}
