//! Concurrent batch execution.
//!
//! Each job runs end-to-end on its own task; at most `parallelism` run at
//! once. Jobs share nothing but the stores, which are namespaced per job.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::job::BuildJob;
use crate::pipeline::Pipeline;
use crate::project::Project;

/// Run every `(job, project)` request and return the finished jobs in request order.
///
/// A job whose task panics is forced to `Failed`; it never takes other jobs down.
pub async fn run_batch(pipeline: Arc<Pipeline>, requests: Vec<(BuildJob, Project)>, parallelism: usize) -> Vec<BuildJob> {
  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let total = requests.len();

  for (index, (job, project)) in requests.into_iter().enumerate() {
    let pipeline = Arc::clone(&pipeline);
    let semaphore = Arc::clone(&semaphore);

    join_set.spawn(async move {
      let _permit = semaphore.acquire_owned().await.ok();
      debug!(job = %job.id, "job started");

      let fallback = job.clone();
      let build = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run(job, &project).await }
      });

      let finished = match build.await {
        Ok(job) => job,
        Err(e) => {
          error!(job = %fallback.id, error = %e, "build task panicked");
          pipeline.fail(fallback, &format!("build task panicked: {}", e))
        }
      };
      (index, finished)
    });
  }

  let mut results: Vec<Option<BuildJob>> = vec![None; total];
  while let Some(join_result) = join_set.join_next().await {
    match join_result {
      Ok((index, job)) => results[index] = Some(job),
      Err(e) => error!(error = %e, "job task panicked"),
    }
  }

  results.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BuildConfig;
  use crate::job::JobState;
  use crate::project::Flavor;
  use crate::util::testutil::project;
  use tempfile::TempDir;

  fn pipeline(temp: &TempDir) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(BuildConfig {
      store_root: temp.path().join("store"),
      work_root: Some(temp.path().to_path_buf()),
      ..Default::default()
    }))
  }

  #[tokio::test]
  async fn results_keep_request_order() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline(&temp);
    let mut requests = Vec::new();
    for name in ["a", "b", "c", "d"] {
      let project = project(name, Flavor::Native, "9");
      let job = pipeline.enqueue(&project).unwrap();
      requests.push((job, project));
    }
    let ids: Vec<_> = requests.iter().map(|(job, _)| job.id).collect();

    let finished = run_batch(Arc::clone(&pipeline), requests, 2).await;

    assert_eq!(finished.iter().map(|j| j.id).collect::<Vec<_>>(), ids);
    assert!(finished.iter().all(|j| j.state == JobState::Failed));
    for job in &finished {
      assert_eq!(pipeline.jobs().load(job.id).unwrap().state, JobState::Failed);
    }
  }

  #[tokio::test]
  async fn empty_batch() {
    let temp = TempDir::new().unwrap();
    assert!(run_batch(pipeline(&temp), Vec::new(), 0).await.is_empty());
  }
}
