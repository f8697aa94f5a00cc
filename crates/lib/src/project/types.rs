use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A project's source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
  /// Native C source tree built by the SDK toolchain.
  Native,
  /// A single user script embedded into a fixed runtime template.
  SimplyJs,
  /// Script sources and image resources layered onto a runtime template.
  PebbleJs,
}

/// Which binary a source file is compiled into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTarget {
  #[default]
  App,
  Worker,
}

/// Where a file's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contents {
  Text(String),
  Bytes(Vec<u8>),
  File(PathBuf),
}

impl Contents {
  pub fn read(&self) -> io::Result<Vec<u8>> {
    match self {
      Contents::Text(text) => Ok(text.as_bytes().to_vec()),
      Contents::Bytes(bytes) => Ok(bytes.clone()),
      Contents::File(path) => std::fs::read(path),
    }
  }

  pub fn read_to_string(&self) -> io::Result<String> {
    match self {
      Contents::Text(text) => Ok(text.clone()),
      other => String::from_utf8(other.read()?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
    }
  }

  /// Write the contents to `dest` atomically.
  ///
  /// The bytes land in a temporary file next to `dest` which is then renamed
  /// over it, so readers never observe a half-written file.
  pub fn copy_to_path(&self, dest: &Path) -> io::Result<()> {
    let parent = dest
      .parent()
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent directory"))?;
    let bytes = self.read()?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
  }

  fn rebase(&mut self, base: &Path) {
    if let Contents::File(path) = self
      && path.is_relative()
    {
      *path = base.join(&*path);
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
  pub file_name: String,
  #[serde(default)]
  pub target: SourceTarget,
  pub contents: Contents,
}

impl SourceFile {
  pub fn copy_to_path(&self, dest: &Path) -> io::Result<()> {
    self.contents.copy_to_path(dest)
  }

  pub fn is_script(&self) -> bool {
    self.file_name.ends_with(".js")
  }
}

/// Resource kind, deciding which resource subdirectory a file goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
  Png,
  PngTrans,
  Pbi,
  Font,
  Raw,
}

impl ResourceKind {
  pub fn dir(self) -> &'static str {
    match self {
      ResourceKind::Png | ResourceKind::PngTrans | ResourceKind::Pbi => "images",
      ResourceKind::Font => "fonts",
      ResourceKind::Raw => "data",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      ResourceKind::Png => "png",
      ResourceKind::PngTrans => "png-trans",
      ResourceKind::Pbi => "pbi",
      ResourceKind::Font => "font",
      ResourceKind::Raw => "raw",
    }
  }
}

/// One name a resource is exposed under in the app manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
  pub resource_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub character_regex: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tracking: Option<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compatibility: Option<String>,
}

/// A platform/tag-specific payload of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVariant {
  #[serde(default)]
  pub tags: Vec<String>,
  pub contents: Contents,
}

impl ResourceVariant {
  pub fn is_default(&self) -> bool {
    self.tags.is_empty()
  }

  /// File name of this variant: tags are inserted before the extension
  /// (`logo.png` + `[bw]` → `logo~bw.png`).
  pub fn file_name(&self, base: &str) -> String {
    if self.tags.is_empty() {
      return base.to_string();
    }
    let suffix: String = self.tags.iter().map(|t| format!("~{}", t)).collect();
    match base.rfind('.') {
      Some(dot) if dot > 0 => format!("{}{}{}", &base[..dot], suffix, &base[dot..]),
      _ => format!("{}{}", base, suffix),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
  pub file_name: String,
  pub kind: ResourceKind,
  #[serde(default)]
  pub identifiers: Vec<ResourceIdentifier>,
  #[serde(default)]
  pub is_menu_icon: bool,
  pub variants: Vec<ResourceVariant>,
}

impl ResourceFile {
  pub fn default_variant(&self) -> Option<&ResourceVariant> {
    self.variants.iter().find(|v| v.is_default())
  }
}

/// A buildable project as handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub name: String,
  pub app_short_name: String,
  #[serde(default)]
  pub app_long_name: Option<String>,
  pub app_uuid: String,
  #[serde(default)]
  pub app_company_name: String,
  #[serde(default = "default_version_label")]
  pub app_version_label: String,
  #[serde(default)]
  pub app_is_watchface: bool,
  #[serde(default)]
  pub app_keys: BTreeMap<String, u32>,
  #[serde(default)]
  pub app_capabilities: Vec<String>,
  /// Restricts the platforms listed in the manifest; all SDK platforms when unset.
  #[serde(default)]
  pub app_platforms: Option<Vec<String>>,
  pub project_type: Flavor,
  /// Kept as text: an unsupported version must fail the job, not the load.
  pub sdk_version: String,
  #[serde(default)]
  pub source_files: Vec<SourceFile>,
  #[serde(default)]
  pub resources: Vec<ResourceFile>,
}

fn default_version_label() -> String {
  "1.0".to_string()
}

impl Project {
  pub fn long_name(&self) -> &str {
    self.app_long_name.as_deref().unwrap_or(&self.name)
  }

  pub fn has_worker_sources(&self) -> bool {
    self.source_files.iter().any(|f| f.target == SourceTarget::Worker)
  }

  /// Resolve relative `File` contents against `base`.
  pub fn rebase_files(&mut self, base: &Path) {
    for file in &mut self.source_files {
      file.contents.rebase(base);
    }
    for resource in &mut self.resources {
      for variant in &mut resource.variants {
        variant.contents.rebase(base);
      }
    }
  }
}
