//! Shared utilities.
//!
//! Lexical path handling used by the path-safety checks, and test helpers.

use std::path::{Component, Path, PathBuf};

#[cfg(test)]
pub mod testutil;

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the first component, so an absolute path stays
/// absolute and a relative path that climbs out keeps its leading `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  let mut depth = 0usize;
  for component in path.components() {
    match component {
      Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
      Component::CurDir => {}
      Component::ParentDir => {
        if depth > 0 {
          out.pop();
          depth -= 1;
        } else if !out.has_root() {
          out.push("..");
        }
      }
      Component::Normal(part) => {
        out.push(part);
        depth += 1;
      }
    }
  }
  out
}

/// Whether `path`, once normalized, stays inside `root`.
pub fn is_within(root: &Path, path: &Path) -> bool {
  normalize_path(path).starts_with(normalize_path(root))
}
