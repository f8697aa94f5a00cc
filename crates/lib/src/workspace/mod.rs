//! Workspace assembly.
//!
//! Materializes a project into an empty build directory laid out the way the
//! toolchain expects. Each flavor has its own strategy that builds its tree
//! from scratch:
//!
//! ```text
//! native                    simplyjs / pebblejs
//! ├── appinfo.json          (template clone)
//! ├── wscript               ├── appinfo.json
//! ├── pebble-jshintrc       ├── src/js/...
//! ├── src/...               └── resources/images/...
//! ├── worker_src/...        (only with worker sources)
//! └── resources/{images,fonts,data}/...
//! ```
//!
//! Every destination is checked against its root before anything is written,
//! and every file taken from the project passes the preprocessor gate right
//! after it lands.

mod dir;

pub use dir::BuildDir;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::TemplateConfig;
use crate::consts::{APP_MANIFEST_FILE, BUILD_SCRIPT_FILE, LINT_CONFIG_FILE, USER_SCRIPT_FILE};
use crate::manifest;
use crate::preprocess::{PreprocessError, check_source};
use crate::project::{Contents, Flavor, Project, ResourceKind, SourceTarget};
use crate::target::SdkVersion;
use crate::util::normalize_path;

const RESOURCE_DIRS: &[&str] = &["images", "fonts", "data"];

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("suspicious filename: {0}")]
  SuspiciousFilename(String),

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("template directory not found: {0}")]
  TemplateMissing(String),

  #[error("failed to copy template {path}: {source}")]
  Template {
    path: String,
    #[source]
    source: walkdir::Error,
  },

  #[error("resource {0} has no default variant")]
  NoDefaultVariant(String),

  #[error("failed to serialize {file}: {source}")]
  Serialize {
    file: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Preprocess(#[from] PreprocessError),
}

/// An assembled build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledWorkspace {
  pub root: PathBuf,
  /// The concatenated user script, for flavors that embed one.
  pub rendered_script: Option<String>,
}

/// Directory layout strategy, chosen once per job from the project flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceStrategy {
  Native,
  SingleScript,
  ScriptRuntime,
}

impl WorkspaceStrategy {
  pub fn for_flavor(flavor: Flavor) -> Self {
    match flavor {
      Flavor::Native => WorkspaceStrategy::Native,
      Flavor::SimplyJs => WorkspaceStrategy::SingleScript,
      Flavor::PebbleJs => WorkspaceStrategy::ScriptRuntime,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      WorkspaceStrategy::Native => "native",
      WorkspaceStrategy::SingleScript => "single-script",
      WorkspaceStrategy::ScriptRuntime => "script-runtime",
    }
  }
}

/// Join `name` onto `root`, rejecting names that would land outside it.
///
/// Absolute names, empty names and `..` sequences climbing above `root`
/// are all suspicious.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf, WorkspaceError> {
  let suspicious = || WorkspaceError::SuspiciousFilename(name.to_string());
  if name.is_empty() || Path::new(name).is_absolute() {
    return Err(suspicious());
  }
  let root = normalize_path(root);
  let joined = normalize_path(&root.join(name));
  if joined == root || !joined.starts_with(&root) {
    return Err(suspicious());
  }
  Ok(joined)
}

/// Create `path` and its parents; an existing directory is fine.
pub fn ensure_dir(path: &Path) -> Result<(), WorkspaceError> {
  match std::fs::create_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
    Err(source) => Err(WorkspaceError::CreateDir {
      path: path.display().to_string(),
      source,
    }),
  }
}

/// Populate the empty directory `dir` with a buildable tree for `project`.
pub fn assemble(
  project: &Project,
  sdk: SdkVersion,
  templates: &TemplateConfig,
  dir: &Path,
) -> Result<AssembledWorkspace, WorkspaceError> {
  let strategy = WorkspaceStrategy::for_flavor(project.project_type);
  info!(project = %project.name, strategy = strategy.name(), sdk = %sdk, "assembling workspace");

  let rendered_script = match strategy {
    WorkspaceStrategy::Native => {
      assemble_native(project, sdk, dir)?;
      None
    }
    WorkspaceStrategy::SingleScript => Some(assemble_single_script(project, sdk, &templates.simplyjs, dir)?),
    WorkspaceStrategy::ScriptRuntime => {
      assemble_script_runtime(project, sdk, &templates.pebblejs, dir)?;
      None
    }
  };

  Ok(AssembledWorkspace {
    root: dir.to_path_buf(),
    rendered_script,
  })
}

fn assemble_native(project: &Project, sdk: SdkVersion, root: &Path) -> Result<(), WorkspaceError> {
  let src = root.join("src");
  ensure_dir(&src)?;
  let worker_src = root.join("worker_src");
  if project.has_worker_sources() {
    ensure_dir(&worker_src)?;
  }
  let resources = root.join("resources");
  for kind_dir in RESOURCE_DIRS {
    ensure_dir(&resources.join(kind_dir))?;
  }

  write_sources(project, root, &src, &worker_src)?;

  for resource in &project.resources {
    let kind_dir = resources.join(resource.kind.dir());
    for variant in &resource.variants {
      let dest = safe_join(&kind_dir, &variant.file_name(&resource.file_name))?;
      write_resource(&variant.contents, root, &dest)?;
    }
  }

  write_json(root, APP_MANIFEST_FILE, &manifest::app_manifest(project, sdk))?;
  write_text(&root.join(BUILD_SCRIPT_FILE), manifest::build_script(sdk))?;
  write_text(&root.join(LINT_CONFIG_FILE), manifest::lint_config())?;
  Ok(())
}

fn assemble_single_script(
  project: &Project,
  sdk: SdkVersion,
  template: &Path,
  root: &Path,
) -> Result<String, WorkspaceError> {
  clone_template(template, root)?;

  let mut scripts = Vec::new();
  for file in project.source_files.iter().filter(|f| f.is_script()) {
    let text = file.contents.read_to_string().map_err(|source| WorkspaceError::Write {
      path: file.file_name.clone(),
      source,
    })?;
    scripts.push(text);
  }
  let script = scripts.join("\n\n");

  let bootstrap = manifest::user_script_bootstrap(&script).map_err(|source| WorkspaceError::Serialize {
    file: USER_SCRIPT_FILE,
    source,
  })?;
  let js_dir = root.join("src").join("js");
  ensure_dir(&js_dir)?;
  write_text(&js_dir.join(USER_SCRIPT_FILE), &bootstrap)?;
  write_json(root, APP_MANIFEST_FILE, &manifest::simplyjs_manifest(project, sdk))?;
  Ok(script)
}

fn assemble_script_runtime(
  project: &Project,
  sdk: SdkVersion,
  template: &Path,
  root: &Path,
) -> Result<(), WorkspaceError> {
  clone_template(template, root)?;

  let js_dir = root.join("src").join("js");
  ensure_dir(&js_dir)?;
  // Worker sources have no separate tree in the script runtime.
  write_sources(project, root, &js_dir, &js_dir)?;

  let images = root.join("resources").join(ResourceKind::Png.dir());
  ensure_dir(&images)?;
  for resource in project.resources.iter().filter(|r| r.kind == ResourceKind::Png) {
    let variant = resource
      .default_variant()
      .ok_or_else(|| WorkspaceError::NoDefaultVariant(resource.file_name.clone()))?;
    let dest = safe_join(&images, &resource.file_name)?;
    write_resource(&variant.contents, root, &dest)?;
  }

  write_json(root, APP_MANIFEST_FILE, &manifest::pebblejs_manifest(project, sdk))?;
  Ok(())
}

/// Copy every source file into the directory chosen for its target, then
/// run the preprocessor gate over what was written.
fn write_sources(project: &Project, root: &Path, app_dir: &Path, worker_dir: &Path) -> Result<(), WorkspaceError> {
  for file in &project.source_files {
    let dir = match file.target {
      SourceTarget::App => app_dir,
      SourceTarget::Worker => worker_dir,
    };
    let dest = safe_join(dir, &file.file_name)?;
    if let Some(parent) = dest.parent() {
      ensure_dir(parent)?;
    }
    file.copy_to_path(&dest).map_err(|source| WorkspaceError::Write {
      path: dest.display().to_string(),
      source,
    })?;
    gate(root, &dest)?;
    debug!(file = %file.file_name, target = ?file.target, "wrote source file");
  }
  Ok(())
}

/// Copy a resource and gate it; a quoted include can reach it as easily as a source.
fn write_resource(contents: &Contents, root: &Path, dest: &Path) -> Result<(), WorkspaceError> {
  copy_contents(contents, dest)?;
  gate(root, dest)
}

/// Run the preprocessor gate over the file as it landed on disk.
fn gate(root: &Path, written: &Path) -> Result<(), WorkspaceError> {
  let bytes = std::fs::read(written).map_err(|source| WorkspaceError::Write {
    path: written.display().to_string(),
    source,
  })?;
  check_source(root, written, &String::from_utf8_lossy(&bytes))?;
  Ok(())
}

fn copy_contents(contents: &Contents, dest: &Path) -> Result<(), WorkspaceError> {
  if let Some(parent) = dest.parent() {
    ensure_dir(parent)?;
  }
  contents.copy_to_path(dest).map_err(|source| WorkspaceError::Write {
    path: dest.display().to_string(),
    source,
  })
}

fn write_text(path: &Path, text: &str) -> Result<(), WorkspaceError> {
  std::fs::write(path, text).map_err(|source| WorkspaceError::Write {
    path: path.display().to_string(),
    source,
  })
}

fn write_json(root: &Path, file: &'static str, value: &serde_json::Value) -> Result<(), WorkspaceError> {
  let text = serde_json::to_string_pretty(value).map_err(|source| WorkspaceError::Serialize { file, source })?;
  write_text(&root.join(file), &text)
}

/// Copy the template tree rooted at `template` into `dest`.
fn clone_template(template: &Path, dest: &Path) -> Result<(), WorkspaceError> {
  if !template.is_dir() {
    return Err(WorkspaceError::TemplateMissing(template.display().to_string()));
  }
  debug!(template = %template.display(), "cloning template");

  for entry in WalkDir::new(template).min_depth(1) {
    let entry = entry.map_err(|source| WorkspaceError::Template {
      path: template.display().to_string(),
      source,
    })?;
    let Ok(rel) = entry.path().strip_prefix(template) else {
      continue;
    };
    let target = dest.join(rel);
    if entry.file_type().is_dir() {
      ensure_dir(&target)?;
    } else if entry.path().is_file() {
      std::fs::copy(entry.path(), &target).map_err(|source| WorkspaceError::Write {
        path: target.display().to_string(),
        source,
      })?;
    }
  }
  Ok(())
}
