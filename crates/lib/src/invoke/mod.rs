//! Sandboxed toolchain invocation.
//!
//! Runs the configured toolchain command in an assembled workspace with a
//! scrubbed environment and hard resource ceilings, and reduces the run to
//! an [`Invocation`]: an outcome plus the build log. Every path, including a
//! failure to start the process at all, produces a log.
//!
//! The toolchain sees:
//! - `PATH`: the toolchain's own directories followed by the host `PATH`
//! - `HOME`: the workspace
//! - `TMPDIR`: `<workspace>/tmp`
//! - `LANG`/`LC_ALL`: `C`
//! - `SOURCE_DATE_EPOCH`: fixed, for reproducible archives
//! - the toolchain's configured extra variables
//!
//! stdout and stderr share one pipe so the log keeps their interleaving.

#[cfg(unix)]
pub(crate) mod sandbox;

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ResourceLimits, ToolchainConfig};
use crate::consts::{BUILD_OUTPUT_DIR, PACKAGE_EXTENSION};

/// How long to wait for the output pipe to drain after the toolchain exits.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Why a toolchain run did not produce a package.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvokeFailure {
  #[error("toolchain exited with {}", describe_exit(.code, .signal))]
  NonZeroExit { code: Option<i32>, signal: Option<i32> },

  #[error("toolchain reported success but did not produce {path}")]
  MissingArtifact { path: String },

  #[error("failed to run toolchain: {message}")]
  Spawn { message: String },

  #[error("toolchain killed after {seconds}s wall-clock limit")]
  TimedOut { seconds: u64 },
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
  match (code, signal) {
    (Some(code), _) => format!("status {}", code),
    (None, Some(signal)) => format!("signal {}", signal),
    (None, None) => "unknown status".to_string(),
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
  /// The package exists at `artifact`.
  Succeeded { artifact: PathBuf },
  Failed(InvokeFailure),
}

#[derive(Debug, Clone)]
pub struct Invocation {
  pub outcome: InvokeOutcome,
  /// Combined toolchain output, or a synthetic message when there was none.
  pub log: String,
  pub build_time: Duration,
}

impl Invocation {
  pub fn succeeded(&self) -> bool {
    matches!(self.outcome, InvokeOutcome::Succeeded { .. })
  }
}

/// Where the toolchain leaves the package: `build/<workspace dir name>.pbw`.
pub fn expected_artifact(workspace: &Path) -> PathBuf {
  let stem = workspace.file_name().map(OsString::from).unwrap_or_default();
  let mut file_name = stem;
  file_name.push(".");
  file_name.push(PACKAGE_EXTENSION);
  workspace.join(BUILD_OUTPUT_DIR).join(file_name)
}

/// Run `toolchain` in `workspace` under `limits`.
pub async fn invoke(workspace: &Path, toolchain: &ToolchainConfig, limits: &ResourceLimits) -> Invocation {
  let start = Instant::now();
  let run = run_toolchain(workspace, toolchain, limits).await;
  let build_time = start.elapsed();

  let (outcome, log) = match run {
    Err(e) => {
      let failure = InvokeFailure::Spawn { message: e.to_string() };
      warn!(error = %e, "toolchain could not be started");
      let log = failure.to_string();
      (InvokeOutcome::Failed(failure), log)
    }
    Ok(Captured { status: None, mut log }) => {
      let seconds = limits.wall_timeout_seconds.unwrap_or_default();
      let failure = InvokeFailure::TimedOut { seconds };
      append_note(&mut log, &failure.to_string());
      (InvokeOutcome::Failed(failure), log)
    }
    Ok(Captured {
      status: Some(status),
      mut log,
    }) if !status.success() => {
      let failure = InvokeFailure::NonZeroExit {
        code: status.code(),
        signal: exit_signal(&status),
      };
      if failure_is_signal(&failure) {
        append_note(&mut log, &failure.to_string());
      }
      (InvokeOutcome::Failed(failure), log)
    }
    Ok(Captured { status: Some(_), mut log }) => {
      let artifact = expected_artifact(workspace);
      if artifact.is_file() {
        (InvokeOutcome::Succeeded { artifact }, log)
      } else {
        let failure = InvokeFailure::MissingArtifact {
          path: artifact.display().to_string(),
        };
        warn!(path = %artifact.display(), "toolchain exited cleanly without a package");
        append_note(&mut log, &failure.to_string());
        (InvokeOutcome::Failed(failure), log)
      }
    }
  };

  match &outcome {
    InvokeOutcome::Succeeded { artifact } => {
      info!(artifact = %artifact.display(), elapsed = ?build_time, "toolchain succeeded")
    }
    InvokeOutcome::Failed(failure) => info!(reason = %failure, elapsed = ?build_time, "toolchain failed"),
  }

  Invocation {
    outcome,
    log,
    build_time,
  }
}

fn failure_is_signal(failure: &InvokeFailure) -> bool {
  matches!(failure, InvokeFailure::NonZeroExit { signal: Some(_), .. })
}

fn append_note(log: &mut String, note: &str) {
  if !log.is_empty() && !log.ends_with('\n') {
    log.push('\n');
  }
  log.push_str(note);
  log.push('\n');
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
  use std::os::unix::process::ExitStatusExt;
  status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
  None
}

struct Captured {
  /// `None` when the wall-clock limit killed the process.
  status: Option<ExitStatus>,
  log: String,
}

fn search_path(toolchain: &ToolchainConfig) -> io::Result<OsString> {
  let host = std::env::var_os("PATH").unwrap_or_default();
  let dirs = toolchain
    .path
    .iter()
    .cloned()
    .chain(std::env::split_paths(&host));
  std::env::join_paths(dirs).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

async fn run_toolchain(workspace: &Path, toolchain: &ToolchainConfig, limits: &ResourceLimits) -> io::Result<Captured> {
  let (program, args) = toolchain
    .command
    .split_first()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty toolchain command"))?;

  let tmp_dir = workspace.join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await?;

  let (reader, writer) = io::pipe()?;

  let mut command = Command::new(program);
  command
    .args(args)
    .current_dir(workspace)
    .env_clear()
    .env("PATH", search_path(toolchain)?)
    .env("HOME", workspace)
    .env("TMPDIR", &tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    // 1980-01-01, the earliest timestamp a zip entry can carry
    .env("SOURCE_DATE_EPOCH", "315532800")
    .envs(&toolchain.env)
    .stdin(Stdio::null())
    .stdout(writer.try_clone()?)
    .stderr(writer)
    .kill_on_drop(true);

  #[cfg(unix)]
  sandbox::confine(&mut command, limits);
  #[cfg(not(unix))]
  warn!("resource limits are not enforced on this platform");

  debug!(program = %program, workspace = %workspace.display(), "spawning toolchain");
  let mut child = command.spawn()?;
  let leader = child.id();
  // Our copies of the write end must close or the reader never sees EOF.
  drop(command);

  let captured = Arc::new(Mutex::new(CappedLog::new(limits.max_log_bytes)));
  let drain = tokio::task::spawn_blocking({
    let captured = Arc::clone(&captured);
    move || drain_pipe(reader, &captured)
  });

  let status = match limits.wall_timeout() {
    Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
      Ok(status) => Some(status?),
      Err(_) => {
        warn!(seconds = limit.as_secs(), "toolchain exceeded wall-clock limit, killing");
        reap_group(leader);
        child.kill().await?;
        None
      }
    },
    None => Some(child.wait().await?),
  };
  // Background processes the toolchain started go with it.
  reap_group(leader);

  // Processes the toolchain left behind may still hold the pipe open.
  match tokio::time::timeout(DRAIN_GRACE, drain).await {
    Ok(Ok(Err(e))) => warn!(error = %e, "failed reading toolchain output"),
    Ok(Err(e)) => warn!(error = %e, "toolchain output reader panicked"),
    Err(_) => warn!("toolchain output still open after exit, log may be incomplete"),
    Ok(Ok(Ok(()))) => {}
  }

  let log = match captured.lock() {
    Ok(log) => log.render(),
    Err(poisoned) => poisoned.into_inner().render(),
  };
  Ok(Captured { status, log })
}

#[cfg(unix)]
fn reap_group(leader: Option<u32>) {
  if let Some(leader) = leader
    && let Err(e) = sandbox::kill_group(leader)
  {
    warn!(pid = leader, error = %e, "failed to kill toolchain process group");
  }
}

#[cfg(not(unix))]
fn reap_group(_leader: Option<u32>) {}

/// Output buffer that keeps the first `limit` bytes and counts the rest.
#[derive(Debug)]
struct CappedLog {
  bytes: Vec<u8>,
  limit: usize,
  dropped: usize,
}

impl CappedLog {
  fn new(limit: usize) -> Self {
    Self {
      bytes: Vec::new(),
      limit,
      dropped: 0,
    }
  }

  fn push(&mut self, chunk: &[u8]) {
    let room = self.limit.saturating_sub(self.bytes.len());
    let keep = room.min(chunk.len());
    self.bytes.extend_from_slice(&chunk[..keep]);
    self.dropped += chunk.len() - keep;
  }

  fn render(&self) -> String {
    let mut log = String::from_utf8_lossy(&self.bytes).into_owned();
    if self.dropped > 0 {
      append_note(&mut log, &format!("[{} bytes of output truncated]", self.dropped));
    }
    log
  }
}

fn drain_pipe(mut reader: io::PipeReader, captured: &Mutex<CappedLog>) -> io::Result<()> {
  let mut buf = [0u8; 8192];
  loop {
    let n = match reader.read(&mut buf) {
      Ok(0) => return Ok(()),
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    match captured.lock() {
      Ok(mut log) => log.push(&buf[..n]),
      Err(poisoned) => poisoned.into_inner().push(&buf[..n]),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expected_artifact_is_named_after_workspace() {
    assert_eq!(
      expected_artifact(Path::new("/tmp/build-abc123")),
      PathBuf::from("/tmp/build-abc123/build/build-abc123.pbw")
    );
  }

  #[test]
  fn capped_log_keeps_prefix() {
    let mut log = CappedLog::new(5);
    log.push(b"abc");
    log.push(b"defgh");
    assert_eq!(log.bytes, b"abcde");
    assert_eq!(log.dropped, 3);
    assert!(log.render().starts_with("abcde\n[3 bytes of output truncated]"));
  }

  #[test]
  fn failure_messages() {
    let exit = InvokeFailure::NonZeroExit {
      code: Some(2),
      signal: None,
    };
    assert_eq!(exit.to_string(), "toolchain exited with status 2");
    let killed = InvokeFailure::NonZeroExit {
      code: None,
      signal: Some(24),
    };
    assert_eq!(killed.to_string(), "toolchain exited with signal 24");
  }

  #[cfg(unix)]
  mod unix {
    use super::*;
    use crate::util::testutil::{script_toolchain, write_script};
    use tempfile::TempDir;

    fn workspace(temp: &TempDir) -> PathBuf {
      let dir = temp.path().join("build-test");
      std::fs::create_dir(&dir).unwrap();
      dir
    }

    fn limits() -> ResourceLimits {
      ResourceLimits {
        wall_timeout_seconds: Some(30),
        ..ResourceLimits::default()
      }
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_output() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "fail.sh", "echo 'src/main.c:3: error: expected ;'\nexit 2\n");

      let run = invoke(&ws, &script_toolchain(&script), &limits()).await;

      assert_eq!(
        run.outcome,
        InvokeOutcome::Failed(InvokeFailure::NonZeroExit {
          code: Some(2),
          signal: None
        })
      );
      assert!(run.log.contains("expected ;"));
    }

    #[tokio::test]
    async fn clean_exit_without_package_is_a_failure() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "lie.sh", "echo 'all good'\nexit 0\n");

      let run = invoke(&ws, &script_toolchain(&script), &limits()).await;

      assert!(matches!(
        run.outcome,
        InvokeOutcome::Failed(InvokeFailure::MissingArtifact { .. })
      ));
      assert!(run.log.starts_with("all good\n"));
      assert!(run.log.contains("did not produce"));
    }

    #[tokio::test]
    async fn package_present_succeeds() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(
        temp.path(),
        "ok.sh",
        "mkdir -p build\necho pbw > \"build/$(basename \"$(pwd)\").pbw\"\necho done >&2\n",
      );

      let run = invoke(&ws, &script_toolchain(&script), &limits()).await;

      assert_eq!(
        run.outcome,
        InvokeOutcome::Succeeded {
          artifact: ws.join("build/build-test.pbw")
        }
      );
      assert!(run.succeeded());
      assert_eq!(run.log, "done\n");
    }

    #[tokio::test]
    async fn stdout_and_stderr_are_interleaved() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "mixed.sh", "echo one\necho two >&2\necho three\nexit 1\n");

      let run = invoke(&ws, &script_toolchain(&script), &limits()).await;

      assert_eq!(run.log, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn spawn_failure_becomes_log() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let toolchain = ToolchainConfig::new(["/nonexistent/buildbox-toolchain"]);

      let run = invoke(&ws, &toolchain, &limits()).await;

      assert!(matches!(run.outcome, InvokeOutcome::Failed(InvokeFailure::Spawn { .. })));
      assert!(run.log.starts_with("failed to run toolchain"));
    }

    #[tokio::test]
    async fn environment_is_scrubbed() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(
        temp.path(),
        "env.sh",
        "echo \"PATH=$PATH\"\necho \"HOME=$HOME\"\necho \"SDK=$SDK_ROOT\"\necho \"USER=${USER:-unset}\"\nexit 1\n",
      );
      let toolchain = script_toolchain(&script)
        .with_path("/opt/arm-cs-tools/bin")
        .with_env("SDK_ROOT", "/opt/sdk");

      let run = invoke(&ws, &toolchain, &limits()).await;

      assert!(run.log.contains("PATH=/opt/arm-cs-tools/bin:"), "{}", run.log);
      assert!(run.log.contains(&format!("HOME={}", ws.display())));
      assert!(run.log.contains("SDK=/opt/sdk"));
      assert!(run.log.contains("USER=unset"));
    }

    #[tokio::test]
    async fn cpu_ceiling_terminates_process() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "spin.sh", "echo started\nwhile :; do :; done\n");
      let limits = ResourceLimits {
        cpu_seconds: 1,
        ..limits()
      };

      let run = invoke(&ws, &script_toolchain(&script), &limits).await;

      match run.outcome {
        InvokeOutcome::Failed(InvokeFailure::NonZeroExit { code: None, signal }) => assert!(signal.is_some()),
        other => panic!("expected signal exit, got {:?}", other),
      }
      assert!(run.log.starts_with("started\n"));
    }

    #[tokio::test]
    async fn wall_clock_limit_kills_sleeping_process() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "sleep.sh", "echo waiting\nexec sleep 30\n");
      let limits = ResourceLimits {
        wall_timeout_seconds: Some(1),
        ..ResourceLimits::default()
      };

      let run = invoke(&ws, &script_toolchain(&script), &limits).await;

      assert_eq!(run.outcome, InvokeOutcome::Failed(InvokeFailure::TimedOut { seconds: 1 }));
      assert!(run.log.contains("waiting"));
      assert!(run.build_time < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn timeout_kills_background_processes() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let marker = temp.path().join("marker");
      let script = write_script(
        temp.path(),
        "fork.sh",
        &format!("(sleep 2; touch {}) &\nsleep 30\n", marker.display()),
      );
      let limits = ResourceLimits {
        wall_timeout_seconds: Some(1),
        ..ResourceLimits::default()
      };

      let started = Instant::now();
      let run = invoke(&ws, &script_toolchain(&script), &limits).await;

      assert_eq!(run.outcome, InvokeOutcome::Failed(InvokeFailure::TimedOut { seconds: 1 }));
      assert!(started.elapsed() < Duration::from_secs(5));
      tokio::time::sleep(Duration::from_secs(3)).await;
      assert!(!marker.exists());
    }

    #[tokio::test]
    async fn clean_exit_kills_leftover_processes() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let marker = temp.path().join("marker");
      let script = write_script(
        temp.path(),
        "daemon.sh",
        &format!("(sleep 2; touch {}) &\necho left running\nexit 1\n", marker.display()),
      );

      let started = Instant::now();
      let run = invoke(&ws, &script_toolchain(&script), &limits()).await;

      assert!(run.log.starts_with("left running\n"));
      assert!(started.elapsed() < Duration::from_secs(2));
      tokio::time::sleep(Duration::from_secs(3)).await;
      assert!(!marker.exists());
    }

    #[tokio::test]
    async fn log_is_capped() {
      let temp = TempDir::new().unwrap();
      let ws = workspace(&temp);
      let script = write_script(temp.path(), "noisy.sh", "i=0\nwhile [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done\nexit 1\n");
      let limits = ResourceLimits {
        max_log_bytes: 100,
        ..limits()
      };

      let run = invoke(&ws, &script_toolchain(&script), &limits).await;

      assert!(run.log.starts_with("0123456789\n"));
      assert!(run.log.contains("[2100 bytes of output truncated]"));
    }
  }
}
