//! Per-platform size extraction from the packaged archive.
//!
//! Sizes are read from the zip entry headers; nothing is decompressed. A
//! platform whose entries are all missing is reported as [`PlatformSizes::Absent`]
//! rather than an error, since not every SDK produces every platform.

use std::fs::File;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::consts::{APP_BINARY_ENTRY, RESOURCE_PACK_ENTRY, WORKER_BINARY_ENTRY};
use crate::job::BuildSizeRecord;
use crate::target::{SdkVersion, WatchPlatform, archive_entry};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to open archive {path}: {source}")]
  Open {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to read archive {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: ZipError,
  },
}

/// Size extraction result for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSizes {
  Found(BuildSizeRecord),
  /// None of the platform's entries are in the archive.
  Absent(WatchPlatform),
}

/// Read component sizes for every platform `sdk` can target.
pub fn extract_sizes(path: &Path, sdk: SdkVersion) -> Result<Vec<PlatformSizes>, ArchiveError> {
  let file = File::open(path).map_err(|source| ArchiveError::Open {
    path: path.display().to_string(),
    source,
  })?;
  let mut archive = ZipArchive::new(file).map_err(|source| ArchiveError::Read {
    path: path.display().to_string(),
    source,
  })?;

  let mut results = Vec::new();
  for &platform in sdk.platforms() {
    let mut size_of = |entry: &str| entry_size(&mut archive, &archive_entry(sdk, platform, entry));
    let binary_size = size_of(APP_BINARY_ENTRY);
    let resource_size = size_of(RESOURCE_PACK_ENTRY);
    let worker_size = size_of(WORKER_BINARY_ENTRY);

    if binary_size.is_none() && resource_size.is_none() && worker_size.is_none() {
      debug!(platform = %platform, "no entries for platform");
      results.push(PlatformSizes::Absent(platform));
      continue;
    }

    let total_size = [binary_size, resource_size, worker_size].into_iter().flatten().sum();
    results.push(PlatformSizes::Found(BuildSizeRecord {
      platform,
      total_size,
      binary_size,
      resource_size,
      worker_size,
    }));
  }
  Ok(results)
}

fn entry_size(archive: &mut ZipArchive<File>, name: &str) -> Option<u64> {
  let index = archive.index_for_name(name)?;
  archive.by_index_raw(index).ok().map(|entry| entry.size())
}
