//! Test utilities for buildbox-lib.
//!
//! Fake toolchains are small `/bin/sh` scripts run through the shell rather
//! than executed directly, so freshly written scripts never hit ETXTBSY.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

use crate::config::ToolchainConfig;
use crate::project::{Contents, Flavor, Project, SourceFile, SourceTarget};

/// Write a shell script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, format!("set -e\n{}", body)).unwrap();
  path
}

/// A toolchain that runs `script` with `/bin/sh`.
pub fn script_toolchain(script: &Path) -> ToolchainConfig {
  ToolchainConfig::new(["/bin/sh".to_string(), script.display().to_string()])
}

/// Write a zip archive at `path` whose entries hold `size` bytes each.
pub fn write_archive(path: &Path, entries: &[(&str, usize)]) {
  let file = std::fs::File::create(path).unwrap();
  let mut zip = zip::ZipWriter::new(file);
  for (name, size) in entries {
    zip.start_file(*name, SimpleFileOptions::default()).unwrap();
    zip.write_all(&vec![0xA5; *size]).unwrap();
  }
  zip.finish().unwrap();
}

/// A minimal project of the given flavor with no files.
pub fn project(name: &str, flavor: Flavor, sdk: &str) -> Project {
  Project {
    name: name.to_string(),
    app_short_name: name.to_lowercase(),
    app_long_name: None,
    app_uuid: "6bf6215b-c97f-409e-8c31-4f55657222b4".to_string(),
    app_company_name: "Example Co".to_string(),
    app_version_label: "1.0".to_string(),
    app_is_watchface: false,
    app_keys: BTreeMap::new(),
    app_capabilities: vec![],
    app_platforms: None,
    project_type: flavor,
    sdk_version: sdk.to_string(),
    source_files: vec![],
    resources: vec![],
  }
}

pub fn source(name: &str, target: SourceTarget, text: &str) -> SourceFile {
  SourceFile {
    file_name: name.to_string(),
    target,
    contents: Contents::Text(text.to_string()),
  }
}
