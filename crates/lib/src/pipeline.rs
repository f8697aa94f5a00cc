//! End-to-end build of one job.
//!
//! ```text
//! sdk ─▶ toolchain ─▶ build dir ─▶ assemble ─▶ invoke ─▶ sizes ─▶ debug maps ─▶ persist
//!  │         │            │            │          │                                ▲
//!  └─────────┴────────────┴────────────┴──────────┴──── failed report ─────────────┘
//! ```
//!
//! Every path ends in [`Pipeline::persist`], which is the only place a job
//! reaches a terminal state. If persisting itself fails, [`Pipeline::fail`]
//! forces the job to `Failed` as a last resort.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::{self, PlatformSizes};
use crate::config::{BuildConfig, ConfigError};
use crate::consts::{BUILD_LOG_ARTIFACT, PACKAGE_ARTIFACT, SCRIPT_ARTIFACT};
use crate::debug_info::{self, DebugMap, DebugOutcome, Symbolizer};
use crate::events::{CompletionEvent, EventSink, TracingEventSink};
use crate::invoke::{self, InvokeOutcome};
use crate::job::{BuildJob, BuildSizeRecord, DebugMapRecord, JobError, JobId, JobState};
use crate::project::Project;
use crate::store::{ArtifactStore, JobStore, LocalArtifactStore, StoreError};
use crate::target::{BinaryKind, InvalidSdkVersion, SdkVersion, WatchPlatform, debug_artifact_name};
use crate::workspace::{self, BuildDir, WorkspaceError};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  InvalidSdk(#[from] InvalidSdkVersion),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("failed to create build directory: {0}")]
  BuildDir(#[source] io::Error),

  #[error(transparent)]
  Workspace(#[from] WorkspaceError),

  #[error("workspace assembly panicked: {0}")]
  AssemblyPanicked(String),

  #[error("failed to read package {path}: {source}")]
  Package {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Job(#[from] JobError),
}

/// Everything a build attempt produced, successful or not.
///
/// Holds the build directory so the package stays on disk until persisted.
#[derive(Default)]
struct BuildReport {
  log: String,
  failure: Option<String>,
  package: Option<PathBuf>,
  rendered_script: Option<String>,
  build_time: Option<Duration>,
  sizes: Vec<BuildSizeRecord>,
  debug_maps: Vec<(WatchPlatform, BinaryKind, DebugMap)>,
  _dir: Option<BuildDir>,
}

impl BuildReport {
  /// A report for a job that failed before the toolchain produced anything.
  fn aborted(reason: String) -> Self {
    Self {
      log: format!("{}\n", reason),
      failure: Some(reason),
      ..Default::default()
    }
  }
}

pub struct Pipeline {
  config: BuildConfig,
  artifacts: Arc<dyn ArtifactStore>,
  jobs: JobStore,
  events: Arc<dyn EventSink>,
  symbolizer: Symbolizer,
}

impl Pipeline {
  /// A pipeline storing into `config.store_root` and logging completion events.
  pub fn new(config: BuildConfig) -> Self {
    Self {
      artifacts: Arc::new(LocalArtifactStore::new(&config.store_root)),
      jobs: JobStore::new(&config.store_root),
      events: Arc::new(TracingEventSink),
      symbolizer: Symbolizer::new(&config.symbolizer, &config.limits),
      config,
    }
  }

  pub fn with_artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
    self.artifacts = artifacts;
    self
  }

  pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
    self.events = events;
    self
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn jobs(&self) -> &JobStore {
    &self.jobs
  }

  pub fn artifacts(&self) -> &dyn ArtifactStore {
    self.artifacts.as_ref()
  }

  /// Record a new `Waiting` job for `project`.
  pub fn enqueue(&self, project: &Project) -> Result<BuildJob, PipelineError> {
    let job = BuildJob::new(project);
    self.jobs.create(&job)?;
    info!(job = %job.id, project = %project.name, "job queued");
    Ok(job)
  }

  /// Build `project` for `job` and drive the job to a terminal state.
  ///
  /// Never fails: every error ends up in the job's log and state.
  pub async fn run(&self, mut job: BuildJob, project: &Project) -> BuildJob {
    info!(job = %job.id, project = %project.name, sdk = %project.sdk_version, "build started");
    let report = self.build(project).await;
    let persisted = self.persist(&mut job, &report);
    // Removes the build directory unless it is being kept.
    drop(report);

    match persisted {
      Ok(()) => {
        info!(job = %job.id, state = %job.state, "build finished");
        self.events.emit(&CompletionEvent::for_job(&job));
        job
      }
      Err(e) => {
        error!(job = %job.id, error = %e, "failed to record build result");
        self.fail(job, &e.to_string())
      }
    }
  }

  /// Force `job` to `Failed` with a synthetic log.
  ///
  /// A job that already reached a terminal state keeps it. Failures to store
  /// the log or the record are logged and otherwise ignored.
  pub fn fail(&self, mut job: BuildJob, reason: &str) -> BuildJob {
    if !job.is_finished() {
      // Outputs only belong to a succeeded job.
      job.total_size = None;
      job.sizes.clear();
      job.debug_maps.clear();
      job.artifacts.clear();
      job.failure = Some(reason.to_string());
      let log = format!("Something broke:\n{}\n", reason);
      match self.artifacts.put_bytes(job.id, BUILD_LOG_ARTIFACT, log.as_bytes()) {
        Ok(()) => job.record_artifact(BUILD_LOG_ARTIFACT),
        Err(e) => warn!(job = %job.id, error = %e, "could not store failure log"),
      }
      if let Err(e) = job.finish(JobState::Failed) {
        warn!(job = %job.id, error = %e, "unexpected state transition error");
      }
    }
    if let Err(e) = self.jobs.save(&job) {
      error!(job = %job.id, error = %e, "could not save job record");
    }
    self.events.emit(&CompletionEvent::for_job(&job));
    job
  }

  async fn build(&self, project: &Project) -> BuildReport {
    match self.compile(project).await {
      Ok(report) => report,
      Err(e) => {
        error!(project = %project.name, error = %e, "build aborted");
        BuildReport::aborted(e.to_string())
      }
    }
  }

  async fn compile(&self, project: &Project) -> Result<BuildReport, PipelineError> {
    let sdk: SdkVersion = project.sdk_version.parse()?;
    let toolchain = self.config.toolchain(sdk)?;
    let dir = BuildDir::create(self.config.work_root.as_deref(), self.config.keep_workspaces)
      .map_err(PipelineError::BuildDir)?;

    let assembled = {
      let project = project.clone();
      let templates = self.config.templates.clone();
      let root = dir.path().to_path_buf();
      tokio::task::spawn_blocking(move || workspace::assemble(&project, sdk, &templates, &root))
        .await
        .map_err(|e| PipelineError::AssemblyPanicked(e.to_string()))??
    };

    let invocation = invoke::invoke(&assembled.root, toolchain, &self.config.limits).await;
    let mut report = BuildReport {
      log: invocation.log,
      build_time: Some(invocation.build_time),
      ..Default::default()
    };

    match invocation.outcome {
      InvokeOutcome::Failed(failure) => {
        report.failure = Some(failure.to_string());
      }
      InvokeOutcome::Succeeded { artifact } => {
        report.sizes = package_sizes(&artifact, sdk);
        report.debug_maps = self.debug_maps(&assembled.root, sdk).await;
        report.rendered_script = assembled.rendered_script;
        report.package = Some(artifact);
      }
    }
    report._dir = Some(dir);
    Ok(report)
  }

  async fn debug_maps(&self, workspace: &Path, sdk: SdkVersion) -> Vec<(WatchPlatform, BinaryKind, DebugMap)> {
    debug_info::extract_debug_maps(workspace, sdk, &self.symbolizer)
      .await
      .into_iter()
      .filter_map(|report| match report.outcome {
        DebugOutcome::Extracted(map) => Some((report.platform, report.kind, map)),
        DebugOutcome::Missing | DebugOutcome::Failed(_) => None,
      })
      .collect()
  }

  /// Store the report's artifacts and move `job` to its terminal state.
  ///
  /// Every store write happens before `job` is touched, so an error leaves
  /// the record as it was.
  fn persist(&self, job: &mut BuildJob, report: &BuildReport) -> Result<(), PipelineError> {
    let outputs = match &report.package {
      Some(package) => Some(self.store_outputs(job.id, package, report)?),
      None => None,
    };
    self.artifacts.put_bytes(job.id, BUILD_LOG_ARTIFACT, report.log.as_bytes())?;

    job.record_artifact(BUILD_LOG_ARTIFACT);
    job.failure = report.failure.clone();
    if let Some(elapsed) = report.build_time {
      job.set_build_time(elapsed);
    }
    let state = match outputs {
      Some(outputs) => {
        outputs.apply(job);
        JobState::Succeeded
      }
      None => JobState::Failed,
    };
    job.finish(state)?;
    self.jobs.save(job)?;
    Ok(())
  }

  fn store_outputs(&self, id: JobId, package: &Path, report: &BuildReport) -> Result<StoredOutputs, PipelineError> {
    let total_size = std::fs::metadata(package)
      .map_err(|source| PipelineError::Package {
        path: package.display().to_string(),
        source,
      })?
      .len();
    self.artifacts.put_file(id, PACKAGE_ARTIFACT, package)?;
    let mut artifacts = vec![PACKAGE_ARTIFACT.to_string()];

    if let Some(script) = &report.rendered_script {
      self.artifacts.put_bytes(id, SCRIPT_ARTIFACT, script.as_bytes())?;
      artifacts.push(SCRIPT_ARTIFACT.to_string());
    }

    let debug_maps: Vec<DebugMapRecord> = report
      .debug_maps
      .iter()
      .filter_map(|(platform, kind, map)| self.store_debug_map(id, *platform, *kind, map))
      .collect();
    artifacts.extend(debug_maps.iter().map(|record| record.artifact.clone()));

    Ok(StoredOutputs {
      total_size,
      sizes: report.sizes.clone(),
      debug_maps,
      artifacts,
    })
  }

  /// A map that cannot be stored is left out; the build still counts.
  fn store_debug_map(&self, id: JobId, platform: WatchPlatform, kind: BinaryKind, map: &DebugMap) -> Option<DebugMapRecord> {
    let name = debug_artifact_name(platform, kind);
    let stored = serde_json::to_vec(map)
      .map_err(StoreError::Serialize)
      .and_then(|bytes| self.artifacts.put_bytes(id, &name, &bytes));
    match stored {
      Ok(()) => Some(DebugMapRecord {
        platform,
        kind,
        artifact: name,
      }),
      Err(e) => {
        warn!(job = %id, platform = %platform, kind = %kind, error = %e, "could not store debug map");
        None
      }
    }
  }
}

/// What a successful build left in the artifact store.
struct StoredOutputs {
  total_size: u64,
  sizes: Vec<BuildSizeRecord>,
  debug_maps: Vec<DebugMapRecord>,
  artifacts: Vec<String>,
}

impl StoredOutputs {
  fn apply(self, job: &mut BuildJob) {
    job.total_size = Some(self.total_size);
    job.sizes = self.sizes;
    job.debug_maps = self.debug_maps;
    for name in &self.artifacts {
      job.record_artifact(name);
    }
  }
}

/// Size records for the platforms present in the package. Never fails the job.
fn package_sizes(package: &Path, sdk: SdkVersion) -> Vec<BuildSizeRecord> {
  match archive::extract_sizes(package, sdk) {
    Ok(results) => results
      .into_iter()
      .filter_map(|sizes| match sizes {
        PlatformSizes::Found(record) => Some(record),
        PlatformSizes::Absent(platform) => {
          debug!(platform = %platform, "platform not in package");
          None
        }
      })
      .collect(),
    Err(e) => {
      warn!(package = %package.display(), error = %e, "could not read package sizes");
      Vec::new()
    }
  }
}
