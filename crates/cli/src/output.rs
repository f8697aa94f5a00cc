//! CLI output formatting utilities.
//!
//! Job-state markers, package size breakdowns, build durations and JSON output.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use buildbox_lib::job::{BuildSizeRecord, JobState};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCEEDED: &str = "✓";
  pub const FAILED: &str = "✗";
  pub const WAITING: &str = "…";
  pub const INFO: &str = "•";
}

/// Colored marker for a job in `state`.
pub fn state_symbol(state: JobState, stream: Stream) -> String {
  match state {
    JobState::Succeeded => symbols::SUCCEEDED.if_supports_color(stream, |s| s.green()).to_string(),
    JobState::Failed => symbols::FAILED.if_supports_color(stream, |s| s.red()).to_string(),
    JobState::Waiting => symbols::WAITING.if_supports_color(stream, |s| s.yellow()).to_string(),
  }
}

/// Print `message` after the marker for `state`; failures go to stderr.
pub fn print_status(state: JobState, message: &str) {
  match state {
    JobState::Failed => eprintln!(
      "{} {}",
      state_symbol(state, Stream::Stderr),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
    _ => println!("{} {}", state_symbol(state, Stream::Stdout), message),
  }
}

/// Packages are bounded by the output-file ceiling, so MB is the largest unit.
pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;

  match bytes {
    b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
    b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
    b => format!("{} B", b),
  }
}

/// `basalt: 1.2 KB (binary 1.0 KB, resources 200 B)`.
pub fn format_size_record(record: &BuildSizeRecord) -> String {
  let parts: Vec<String> = [
    ("binary", record.binary_size),
    ("resources", record.resource_size),
    ("worker", record.worker_size),
  ]
  .into_iter()
  .filter_map(|(label, size)| size.map(|size| format!("{} {}", label, format_bytes(size))))
  .collect();
  format!(
    "{}: {} ({})",
    record.platform,
    format_bytes(record.total_size),
    parts.join(", ")
  )
}

/// Build times run from milliseconds up to the wall-clock limit.
pub fn format_duration(duration: Duration) -> String {
  match duration.as_secs() {
    0 => format!("{}ms", duration.subsec_millis()),
    secs @ 1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    secs => format!("{}m {}s", secs / 60, secs % 60),
  }
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use buildbox_lib::target::WatchPlatform;

  #[test]
  fn test_format_bytes() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(500), "500 B");
    assert_eq!(format_bytes(1024), "1.0 KB");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(1048576), "1.0 MB");
    assert_eq!(format_bytes(3 * 1073741824), "3072.0 MB");
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    assert_eq!(format_duration(Duration::ZERO), "0ms");
  }

  #[test]
  fn size_record_lists_present_components() {
    let record = BuildSizeRecord {
      platform: WatchPlatform::Aplite,
      total_size: 1224,
      binary_size: Some(1024),
      resource_size: None,
      worker_size: Some(200),
    };
    assert_eq!(format_size_record(&record), "aplite: 1.2 KB (binary 1.0 KB, worker 200 B)");
  }

  #[test]
  fn every_state_has_a_marker() {
    for state in [JobState::Waiting, JobState::Succeeded, JobState::Failed] {
      assert!(!state_symbol(state, Stream::Stdout).is_empty());
    }
  }
}
