//! SDK versions, hardware platforms and the per-combination layout tables.
//!
//! Everything that differs between SDK generations is looked up here rather
//! than special-cased at the call site:
//!
//! - which platforms an SDK can build for
//! - where a platform's components live inside the packaged archive
//! - where the toolchain leaves debug binaries
//! - what each debug map is called in the artifact store

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{APP_ELF, BUILD_OUTPUT_DIR, WORKER_ELF};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid sdk version: {0:?}")]
pub struct InvalidSdkVersion(pub String);

/// SDK generation a project is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SdkVersion {
  #[serde(rename = "2")]
  V2,
  #[serde(rename = "3")]
  V3,
}

impl SdkVersion {
  pub const ALL: [SdkVersion; 2] = [SdkVersion::V2, SdkVersion::V3];

  pub fn as_str(self) -> &'static str {
    match self {
      SdkVersion::V2 => "2",
      SdkVersion::V3 => "3",
    }
  }

  /// Platforms the toolchain for this SDK may produce components for.
  pub fn platforms(self) -> &'static [WatchPlatform] {
    match self {
      SdkVersion::V2 => &[WatchPlatform::Aplite],
      SdkVersion::V3 => &[WatchPlatform::Aplite, WatchPlatform::Basalt, WatchPlatform::Chalk],
    }
  }
}

impl FromStr for SdkVersion {
  type Err = InvalidSdkVersion;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "2" => Ok(SdkVersion::V2),
      "3" => Ok(SdkVersion::V3),
      other => Err(InvalidSdkVersion(other.to_string())),
    }
  }
}

impl fmt::Display for SdkVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Hardware target profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchPlatform {
  Aplite,
  Basalt,
  Chalk,
}

impl WatchPlatform {
  pub fn as_str(self) -> &'static str {
    match self {
      WatchPlatform::Aplite => "aplite",
      WatchPlatform::Basalt => "basalt",
      WatchPlatform::Chalk => "chalk",
    }
  }
}

impl fmt::Display for WatchPlatform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which binary a debug map describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
  App,
  Worker,
}

impl BinaryKind {
  pub const ALL: [BinaryKind; 2] = [BinaryKind::App, BinaryKind::Worker];

  fn elf_name(self) -> &'static str {
    match self {
      BinaryKind::App => APP_ELF,
      BinaryKind::Worker => WORKER_ELF,
    }
  }
}

impl fmt::Display for BinaryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BinaryKind::App => f.write_str("app"),
      BinaryKind::Worker => f.write_str("worker"),
    }
  }
}

/// Where a platform's entries sit inside the packaged archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveLayout {
  /// Entries at the archive root (`pebble-app.bin`).
  Root,
  /// Entries under a directory named after the platform (`basalt/pebble-app.bin`).
  PlatformDir,
}

/// Combinations whose archive entries are stored at the root.
const ROOT_LAYOUT: &[(SdkVersion, WatchPlatform)] = &[(SdkVersion::V2, WatchPlatform::Aplite)];

pub fn archive_layout(sdk: SdkVersion, platform: WatchPlatform) -> ArchiveLayout {
  if ROOT_LAYOUT.contains(&(sdk, platform)) {
    ArchiveLayout::Root
  } else {
    ArchiveLayout::PlatformDir
  }
}

/// Full archive entry name for `entry` on `platform`.
pub fn archive_entry(sdk: SdkVersion, platform: WatchPlatform, entry: &str) -> String {
  match archive_layout(sdk, platform) {
    ArchiveLayout::Root => entry.to_string(),
    ArchiveLayout::PlatformDir => format!("{}/{}", platform, entry),
  }
}

/// Path of a debug binary relative to the workspace root.
///
/// SDK 2 builds a single platform into a flat `build/` directory; later SDKs
/// use one subdirectory per platform.
pub fn debug_binary_path(sdk: SdkVersion, platform: WatchPlatform, kind: BinaryKind) -> PathBuf {
  let build = PathBuf::from(BUILD_OUTPUT_DIR);
  match sdk {
    SdkVersion::V2 => build.join(kind.elf_name()),
    SdkVersion::V3 => build.join(platform.as_str()).join(kind.elf_name()),
  }
}

/// Artifact name a platform/kind debug map is stored under.
pub fn debug_artifact_name(platform: WatchPlatform, kind: BinaryKind) -> String {
  let prefix = match platform {
    WatchPlatform::Aplite => String::new(),
    other => format!("{}_", other),
  };
  match kind {
    BinaryKind::App => format!("{}debug_info.json", prefix),
    BinaryKind::Worker => format!("{}worker_debug_info.json", prefix),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::APP_BINARY_ENTRY;

  #[test]
  fn parses_supported_versions() {
    assert_eq!("2".parse::<SdkVersion>(), Ok(SdkVersion::V2));
    assert_eq!(" 3 ".parse::<SdkVersion>(), Ok(SdkVersion::V3));
  }

  #[test]
  fn rejects_unknown_versions() {
    assert_eq!("4".parse::<SdkVersion>(), Err(InvalidSdkVersion("4".to_string())));
    assert!("".parse::<SdkVersion>().is_err());
    assert!("3.1".parse::<SdkVersion>().is_err());
  }

  #[test]
  fn sdk_serializes_as_bare_number() {
    assert_eq!(serde_json::to_string(&SdkVersion::V3).unwrap(), "\"3\"");
    let parsed: SdkVersion = serde_json::from_str("\"2\"").unwrap();
    assert_eq!(parsed, SdkVersion::V2);
  }

  #[test]
  fn platform_sets_per_sdk() {
    assert_eq!(SdkVersion::V2.platforms(), &[WatchPlatform::Aplite]);
    assert_eq!(SdkVersion::V3.platforms().len(), 3);
  }

  #[test]
  fn only_legacy_aplite_uses_root_layout() {
    for sdk in SdkVersion::ALL {
      for platform in [WatchPlatform::Aplite, WatchPlatform::Basalt, WatchPlatform::Chalk] {
        let expected = if sdk == SdkVersion::V2 && platform == WatchPlatform::Aplite {
          ArchiveLayout::Root
        } else {
          ArchiveLayout::PlatformDir
        };
        assert_eq!(archive_layout(sdk, platform), expected, "{} {}", sdk, platform);
      }
    }
  }

  #[test]
  fn archive_entry_names() {
    assert_eq!(
      archive_entry(SdkVersion::V2, WatchPlatform::Aplite, APP_BINARY_ENTRY),
      "pebble-app.bin"
    );
    assert_eq!(
      archive_entry(SdkVersion::V3, WatchPlatform::Aplite, APP_BINARY_ENTRY),
      "aplite/pebble-app.bin"
    );
  }

  #[test]
  fn debug_binary_layout_depends_on_sdk() {
    assert_eq!(
      debug_binary_path(SdkVersion::V2, WatchPlatform::Aplite, BinaryKind::Worker),
      PathBuf::from("build/pebble-worker.elf")
    );
    assert_eq!(
      debug_binary_path(SdkVersion::V3, WatchPlatform::Chalk, BinaryKind::App),
      PathBuf::from("build/chalk/pebble-app.elf")
    );
  }

  #[test]
  fn debug_artifact_names() {
    assert_eq!(debug_artifact_name(WatchPlatform::Aplite, BinaryKind::App), "debug_info.json");
    assert_eq!(
      debug_artifact_name(WatchPlatform::Aplite, BinaryKind::Worker),
      "worker_debug_info.json"
    );
    assert_eq!(
      debug_artifact_name(WatchPlatform::Basalt, BinaryKind::App),
      "basalt_debug_info.json"
    );
    assert_eq!(
      debug_artifact_name(WatchPlatform::Chalk, BinaryKind::Worker),
      "chalk_worker_debug_info.json"
    );
  }
}
