use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

/// An isolated build directory owned by one job.
///
/// Removed when dropped, on every exit path, unless created with `keep`.
#[derive(Debug)]
pub struct BuildDir {
  dir: Option<TempDir>,
  path: PathBuf,
  keep: bool,
}

impl BuildDir {
  /// Create a fresh, empty directory under `work_root` (the system temp
  /// dir when `None`).
  pub fn create(work_root: Option<&Path>, keep: bool) -> io::Result<Self> {
    let dir = match work_root {
      Some(root) => {
        std::fs::create_dir_all(root)?;
        tempfile::Builder::new().prefix("build-").tempdir_in(root)?
      }
      None => tempfile::Builder::new().prefix("build-").tempdir()?,
    };
    // Path-safety checks compare lexically, so resolve symlinked temp roots once.
    let path = dunce::canonicalize(dir.path())?;
    debug!(path = %path.display(), "created build directory");
    Ok(Self {
      dir: Some(dir),
      path,
      keep,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for BuildDir {
  fn drop(&mut self) {
    let Some(dir) = self.dir.take() else {
      return;
    };
    if self.keep {
      let path = dir.keep();
      info!(path = %path.display(), "keeping build directory");
    } else if let Err(e) = dir.close() {
      warn!(path = %self.path.display(), error = %e, "failed to remove build directory");
    }
  }
}
