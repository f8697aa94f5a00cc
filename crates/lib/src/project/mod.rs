//! Project descriptors.
//!
//! Projects, their source files and resources are owned by the surrounding
//! service; the pipeline only reads them. They can also be loaded from a JSON
//! descriptor so builds can be driven from the command line:
//!
//! ```json
//! {
//!   "name": "Weather",
//!   "app_short_name": "weather",
//!   "app_uuid": "6bf6215b-c97f-409e-8c31-4f55657222b4",
//!   "project_type": "native",
//!   "sdk_version": "3",
//!   "source_files": [{ "file_name": "main.c", "contents": { "file": "src/main.c" } }],
//!   "resources": []
//! }
//! ```

mod types;

pub use types::*;

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read project descriptor {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse project descriptor {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

impl Project {
  /// Load a project descriptor, resolving file contents relative to it.
  pub fn load(path: &Path) -> Result<Project, ProjectError> {
    let text = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
      path: path.display().to_string(),
      source,
    })?;
    let mut project: Project = serde_json::from_str(&text).map_err(|source| ProjectError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    if let Some(base) = path.parent() {
      project.rebase_files(base);
    }
    Ok(project)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn variant(tags: &[&str]) -> ResourceVariant {
    ResourceVariant {
      tags: tags.iter().map(|t| t.to_string()).collect(),
      contents: Contents::Bytes(vec![1, 2, 3]),
    }
  }

  #[test]
  fn default_variant_keeps_base_name() {
    assert_eq!(variant(&[]).file_name("logo.png"), "logo.png");
  }

  #[test]
  fn tagged_variant_inserts_tags_before_extension() {
    assert_eq!(variant(&["bw"]).file_name("logo.png"), "logo~bw.png");
    assert_eq!(variant(&["color", "round"]).file_name("logo.png"), "logo~color~round.png");
    assert_eq!(variant(&["bw"]).file_name("blob"), "blob~bw");
    assert_eq!(variant(&["bw"]).file_name(".hidden"), ".hidden~bw");
  }

  #[test]
  fn resource_kind_directories() {
    assert_eq!(ResourceKind::Png.dir(), "images");
    assert_eq!(ResourceKind::PngTrans.dir(), "images");
    assert_eq!(ResourceKind::Pbi.dir(), "images");
    assert_eq!(ResourceKind::Font.dir(), "fonts");
    assert_eq!(ResourceKind::Raw.dir(), "data");
  }

  #[test]
  fn copy_to_path_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("main.c");
    std::fs::write(&dest, "old").unwrap();

    Contents::Text("int main;".to_string()).copy_to_path(&dest).unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "int main;");
    // Only the destination remains; the temp file was renamed over it.
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
  }

  #[test]
  fn load_rebases_relative_files() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/main.c"), "int x;").unwrap();
    let descriptor = temp.path().join("project.json");
    std::fs::write(
      &descriptor,
      r#"{
        "name": "Demo",
        "app_short_name": "demo",
        "app_uuid": "00000000-0000-0000-0000-000000000000",
        "project_type": "native",
        "sdk_version": "3",
        "source_files": [
          { "file_name": "main.c", "contents": { "file": "src/main.c" } },
          { "file_name": "worker.c", "target": "worker", "contents": { "text": "int w;" } }
        ]
      }"#,
    )
    .unwrap();

    let project = Project::load(&descriptor).unwrap();

    assert_eq!(project.app_version_label, "1.0");
    assert!(project.has_worker_sources());
    assert_eq!(project.long_name(), "Demo");
    assert_eq!(project.source_files[0].contents.read_to_string().unwrap(), "int x;");
    assert_eq!(
      project.source_files[0].contents,
      Contents::File(temp.path().join("src/main.c"))
    );
  }

  #[test]
  fn load_reports_parse_errors() {
    let temp = TempDir::new().unwrap();
    let descriptor = temp.path().join("project.json");
    std::fs::write(&descriptor, "{ not json").unwrap();

    assert!(matches!(Project::load(&descriptor), Err(ProjectError::Parse { .. })));
  }
}
