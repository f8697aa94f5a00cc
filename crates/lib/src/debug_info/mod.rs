//! Debug map extraction.
//!
//! For every platform and binary kind the SDK can produce, the debug binary
//! left in the build output is symbolized into a [`DebugMap`]: coalesced
//! address ranges mapped to source lines, plus function ranges. The work is
//! best-effort. Each platform/kind pair gets its own [`DebugOutcome`] and a
//! failure in one never affects another.

mod parse;

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ResourceLimits, SymbolizerConfig};
#[cfg(unix)]
use crate::invoke::sandbox;
use crate::target::{BinaryKind, SdkVersion, WatchPlatform, debug_binary_path};

#[derive(Debug, Error)]
pub enum DebugInfoError {
  #[error("symbolizer command is empty")]
  NotConfigured,

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("{program} {flag} failed ({status}): {stderr}")]
  Failed {
    program: String,
    flag: &'static str,
    status: String,
    stderr: String,
  },

  #[error("{program} {flag} killed after {}s", .limit.as_secs())]
  TimedOut {
    program: String,
    flag: &'static str,
    limit: Duration,
  },

  #[error("failed to parse symbolizer output: {0}")]
  Parse(String),
}

/// Address range attributed to one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
  pub start: u64,
  /// Exclusive.
  pub end: u64,
  /// Index into [`DebugMap::files`].
  pub file: usize,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRange {
  pub start: u64,
  /// Exclusive.
  pub end: u64,
  pub name: String,
}

/// Address-to-source table for one debug binary, sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMap {
  pub files: Vec<String>,
  pub lines: Vec<LineRange>,
  pub functions: Vec<FunctionRange>,
}

impl DebugMap {
  /// Source file and line for `address`, if any range covers it.
  pub fn lookup_line(&self, address: u64) -> Option<(&str, u32)> {
    let idx = self.lines.partition_point(|r| r.start <= address).checked_sub(1)?;
    let range = &self.lines[idx];
    if address >= range.end {
      return None;
    }
    self.files.get(range.file).map(|f| (f.as_str(), range.line))
  }

  pub fn lookup_function(&self, address: u64) -> Option<&str> {
    let idx = self.functions.partition_point(|r| r.start <= address).checked_sub(1)?;
    let function = &self.functions[idx];
    (address < function.end).then_some(function.name.as_str())
  }
}

#[derive(Debug)]
pub enum DebugOutcome {
  Extracted(DebugMap),
  /// The toolchain did not produce this binary.
  Missing,
  Failed(DebugInfoError),
}

#[derive(Debug)]
pub struct DebugReport {
  pub platform: WatchPlatform,
  pub kind: BinaryKind,
  pub outcome: DebugOutcome,
}

/// Runs an objdump-compatible tool over debug binaries.
///
/// The binaries come out of untrusted builds, so every run is confined with
/// the toolchain's resource limits and killed after the configured timeout.
#[derive(Debug, Clone)]
pub struct Symbolizer {
  command: Vec<String>,
  timeout: Duration,
  limits: ResourceLimits,
}

impl Symbolizer {
  pub fn new(config: &SymbolizerConfig, limits: &ResourceLimits) -> Self {
    Self {
      command: config.command.clone(),
      timeout: config.timeout(),
      limits: limits.clone(),
    }
  }

  pub async fn symbolize(&self, elf: &Path) -> Result<DebugMap, DebugInfoError> {
    let lines = self.run("--dwarf=decodedline", elf).await?;
    let syms = self.run("--syms", elf).await?;
    // A fault in parsing stays with this binary.
    tokio::task::spawn_blocking(move || parse::debug_map(&lines, &syms))
      .await
      .map_err(|e| DebugInfoError::Parse(e.to_string()))
  }

  async fn run(&self, flag: &'static str, elf: &Path) -> Result<String, DebugInfoError> {
    let (program, args) = self.command.split_first().ok_or(DebugInfoError::NotConfigured)?;
    let mut command = Command::new(program);
    command
      .args(args)
      .arg(flag)
      .arg(elf)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    #[cfg(unix)]
    sandbox::confine(&mut command, &self.limits);

    let spawn_error = |source| DebugInfoError::Spawn {
      program: program.clone(),
      source,
    };
    let child = command.spawn().map_err(spawn_error)?;
    let leader = child.id();

    let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
    reap_group(leader);
    let output = match waited {
      Ok(output) => output.map_err(spawn_error)?,
      Err(_) => {
        return Err(DebugInfoError::TimedOut {
          program: program.clone(),
          flag,
          limit: self.timeout,
        });
      }
    };

    if !output.status.success() {
      return Err(DebugInfoError::Failed {
        program: program.clone(),
        flag,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[cfg(unix)]
fn reap_group(leader: Option<u32>) {
  if let Some(leader) = leader
    && let Err(e) = sandbox::kill_group(leader)
  {
    warn!(pid = leader, error = %e, "failed to kill symbolizer process group");
  }
}

#[cfg(not(unix))]
fn reap_group(_leader: Option<u32>) {}

/// Symbolize every debug binary `sdk` can leave in `workspace`.
pub async fn extract_debug_maps(workspace: &Path, sdk: SdkVersion, symbolizer: &Symbolizer) -> Vec<DebugReport> {
  let mut reports = Vec::new();
  for &platform in sdk.platforms() {
    for kind in BinaryKind::ALL {
      let elf = workspace.join(debug_binary_path(sdk, platform, kind));
      let outcome = if !elf.is_file() {
        debug!(platform = %platform, kind = %kind, "no debug binary");
        DebugOutcome::Missing
      } else {
        match symbolizer.symbolize(&elf).await {
          Ok(map) => {
            debug!(platform = %platform, kind = %kind, lines = map.lines.len(), "symbolized");
            DebugOutcome::Extracted(map)
          }
          Err(e) => {
            warn!(platform = %platform, kind = %kind, error = %e, "symbolization failed");
            DebugOutcome::Failed(e)
          }
        }
      };
      reports.push(DebugReport {
        platform,
        kind,
        outcome,
      });
    }
  }
  reports
}
