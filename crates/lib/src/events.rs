//! Build completion events.
//!
//! One [`CompletionEvent`] is emitted per job when it reaches a terminal
//! state. Where it goes is up to the [`EventSink`]; the default just logs it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::job::{BuildJob, JobId, JobState};

pub const BUILD_SUCCEEDED_EVENT: &str = "app_build_succeeded";
pub const BUILD_FAILED_EVENT: &str = "app_build_failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
  pub build_id: JobId,
  pub event_name: String,
  pub outcome: JobState,
  /// Seconds from job creation to the terminal transition.
  pub job_run_time: f64,
  /// Seconds spent in the toolchain; zero when it never ran.
  pub build_time: f64,
}

impl CompletionEvent {
  pub fn for_job(job: &BuildJob) -> Self {
    let event_name = match job.state {
      JobState::Succeeded => BUILD_SUCCEEDED_EVENT,
      _ => BUILD_FAILED_EVENT,
    };
    Self {
      build_id: job.id,
      event_name: event_name.to_string(),
      outcome: job.state,
      job_run_time: job.run_time().map(|d| d.as_secs_f64()).unwrap_or_default(),
      build_time: job.build_time_ms.map(|ms| ms as f64 / 1000.0).unwrap_or_default(),
    }
  }
}

/// Receiver for completion events.
pub trait EventSink: Send + Sync {
  fn emit(&self, event: &CompletionEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
  fn emit(&self, event: &CompletionEvent) {
    info!(
      event = %event.event_name,
      build_id = %event.build_id,
      job_run_time = event.job_run_time,
      build_time = event.build_time,
      "build completed"
    );
  }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
  events: Mutex<Vec<CompletionEvent>>,
}

impl MemoryEventSink {
  pub fn events(&self) -> Vec<CompletionEvent> {
    match self.events.lock() {
      Ok(events) => events.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}

impl EventSink for MemoryEventSink {
  fn emit(&self, event: &CompletionEvent) {
    match self.events.lock() {
      Ok(mut events) => events.push(event.clone()),
      Err(poisoned) => poisoned.into_inner().push(event.clone()),
    }
  }
}
