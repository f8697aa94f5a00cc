//! Pipeline configuration.
//!
//! Loaded from a TOML file; every field has a default so an absent file is a
//! valid configuration. Store and work-root locations can be overridden with
//! `BUILDBOX_STORE` and `BUILDBOX_WORK_ROOT`.
//!
//! ```toml
//! parallelism = 4
//!
//! [limits]
//! cpu_seconds = 20
//! open_files = 100
//!
//! [toolchains.3]
//! command = ["/opt/sdk3/bin/waf", "configure", "build"]
//! path = ["/opt/arm-cs-tools/bin"]
//!
//! [templates]
//! simplyjs = "/opt/templates/simplyjs"
//! pebblejs = "/opt/templates/pebblejs"
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::paths;
use crate::target::SdkVersion;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("no toolchain configured for sdk version {0}")]
  ToolchainNotConfigured(SdkVersion),
}

/// Ceilings enforced on the toolchain process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
  /// CPU time in seconds (`RLIMIT_CPU`).
  pub cpu_seconds: u64,
  /// Open file descriptors (`RLIMIT_NOFILE`).
  pub open_files: u64,
  /// Address space in bytes (`RLIMIT_AS`).
  pub memory_bytes: u64,
  /// Largest file the process may write (`RLIMIT_FSIZE`).
  pub output_file_bytes: u64,
  /// Supervisor wall-clock timeout; `None` relies on the CPU ceiling alone.
  pub wall_timeout_seconds: Option<u64>,
  /// Captured output beyond this many bytes is dropped from the build log.
  pub max_log_bytes: usize,
}

impl Default for ResourceLimits {
  fn default() -> Self {
    Self {
      cpu_seconds: 20,
      open_files: 100,
      memory_bytes: 1024 * 1024 * 1024,
      output_file_bytes: 5 * 1024 * 1024,
      wall_timeout_seconds: Some(120),
      max_log_bytes: 1024 * 1024,
    }
  }
}

impl ResourceLimits {
  pub fn wall_timeout(&self) -> Option<Duration> {
    self.wall_timeout_seconds.map(Duration::from_secs)
  }
}

/// How to run the toolchain for one SDK version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
  /// Program followed by its arguments.
  pub command: Vec<String>,
  /// Directories prepended to the inherited `PATH`.
  #[serde(default)]
  pub path: Vec<PathBuf>,
  /// Extra environment variables for the toolchain.
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

impl ToolchainConfig {
  pub fn new<S: Into<String>>(command: impl IntoIterator<Item = S>) -> Self {
    Self {
      command: command.into_iter().map(Into::into).collect(),
      path: Vec::new(),
      env: BTreeMap::new(),
    }
  }

  pub fn with_path(mut self, dir: impl Into<PathBuf>) -> Self {
    self.path.push(dir.into());
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }
}

/// Base trees cloned for the script-runtime flavors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
  pub simplyjs: PathBuf,
  pub pebblejs: PathBuf,
}

impl Default for TemplateConfig {
  fn default() -> Self {
    Self {
      simplyjs: PathBuf::from("/opt/buildbox/templates/simplyjs"),
      pebblejs: PathBuf::from("/opt/buildbox/templates/pebblejs"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolizerConfig {
  /// objdump-compatible program (and leading arguments).
  pub command: Vec<String>,
  /// Wall-clock limit for each symbolizer run.
  pub timeout_seconds: u64,
}

impl Default for SymbolizerConfig {
  fn default() -> Self {
    Self {
      command: vec!["arm-none-eabi-objdump".to_string()],
      timeout_seconds: 30,
    }
  }
}

impl SymbolizerConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_seconds)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
  /// Parent of the isolated build directories (system temp dir when unset).
  pub work_root: Option<PathBuf>,
  /// Root of the artifact and job-record store.
  pub store_root: PathBuf,
  /// Leave build directories behind for inspection.
  pub keep_workspaces: bool,
  /// Jobs run concurrently by a batch.
  pub parallelism: usize,
  pub limits: ResourceLimits,
  /// Keyed by SDK version (`"2"`, `"3"`).
  pub toolchains: BTreeMap<String, ToolchainConfig>,
  pub templates: TemplateConfig,
  pub symbolizer: SymbolizerConfig,
}

impl Default for BuildConfig {
  fn default() -> Self {
    let mut toolchains = BTreeMap::new();
    toolchains.insert(
      SdkVersion::V2.as_str().to_string(),
      ToolchainConfig::new(["pebble", "build"]),
    );
    toolchains.insert(
      SdkVersion::V3.as_str().to_string(),
      ToolchainConfig::new(["waf", "configure", "build"]).with_path("/opt/arm-cs-tools/bin"),
    );

    Self {
      work_root: None,
      store_root: paths::store_dir(),
      keep_workspaces: false,
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
      limits: ResourceLimits::default(),
      toolchains,
      templates: TemplateConfig::default(),
      symbolizer: SymbolizerConfig::default(),
    }
  }
}

impl BuildConfig {
  /// Load the config file at `path`, or the default location when `None`.
  ///
  /// A missing file yields the defaults. Environment overrides are applied last.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(paths::default_config_file);

    let mut config = match std::fs::read_to_string(&path) {
      Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
      })?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no config file, using defaults");
        BuildConfig::default()
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.display().to_string(),
          source,
        });
      }
    };

    config.apply_env_overrides();
    Ok(config)
  }

  pub fn apply_env_overrides(&mut self) {
    if let Ok(store) = std::env::var(crate::consts::STORE_ENV)
      && !store.is_empty()
    {
      self.store_root = PathBuf::from(store);
    }
    if let Some(work_root) = paths::work_root_override() {
      self.work_root = Some(work_root);
    }
  }

  /// The toolchain for `sdk`; a missing entry fails the job before anything runs.
  pub fn toolchain(&self, sdk: SdkVersion) -> Result<&ToolchainConfig, ConfigError> {
    self
      .toolchains
      .get(sdk.as_str())
      .filter(|t| !t.command.is_empty())
      .ok_or(ConfigError::ToolchainNotConfigured(sdk))
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism.max(1)
  }
}
