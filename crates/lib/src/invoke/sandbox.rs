//! Resource ceilings and process-group isolation for untrusted subprocesses.
//!
//! Limits are installed with `setrlimit` between `fork` and `exec`, so they
//! bind the child and everything it spawns but never the supervising worker.
//! Each confined child also leads its own process group, so a kill reaches
//! anything it left running in the background.

use std::io;

use rustix::io::Errno;
use rustix::process::{Pid, Resource, Rlimit, Signal, kill_process_group, setrlimit};
use tokio::process::Command;

use crate::config::ResourceLimits;

fn hard(value: u64) -> Rlimit {
  Rlimit {
    current: Some(value),
    maximum: Some(value),
  }
}

fn apply(limits: &ResourceLimits) -> io::Result<()> {
  setrlimit(Resource::Cpu, hard(limits.cpu_seconds))?;
  setrlimit(Resource::Nofile, hard(limits.open_files))?;
  // RLIMIT_RSS is not enforced on Linux; the address-space ceiling is.
  setrlimit(Resource::As, hard(limits.memory_bytes))?;
  setrlimit(Resource::Fsize, hard(limits.output_file_bytes))?;
  setrlimit(Resource::Core, hard(0))?;
  Ok(())
}

/// Install `limits` on the child `command` will spawn and make it the leader
/// of a new process group.
pub(crate) fn confine(command: &mut Command, limits: &ResourceLimits) {
  command.process_group(0);
  let limits = limits.clone();
  // SAFETY: the hook runs in the forked child before exec and only calls
  // setrlimit, which is async-signal-safe; it allocates nothing.
  unsafe {
    command.pre_exec(move || apply(&limits));
  }
}

/// SIGKILL every process in the group led by `leader`.
///
/// A group that has already gone away is not an error.
pub(crate) fn kill_group(leader: u32) -> io::Result<()> {
  let Some(pid) = i32::try_from(leader).ok().and_then(Pid::from_raw) else {
    return Ok(());
  };
  match kill_process_group(pid, Signal::KILL) {
    Ok(()) => Ok(()),
    Err(e) if e == Errno::SRCH => Ok(()),
    Err(e) => Err(e.into()),
  }
}
