//! Polling job runner.
//!
//! A single loop claims at most one job per tick and awaits its processor
//! to completion before polling again. Throughput for long stages comes
//! from the jobs delegating to external worker processes, not from runner
//! concurrency.

use super::{Job, JobQueue};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Handler for one job type.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process the job payload; the returned value is persisted as the
    /// job result.
    async fn process(&self, payload: serde_json::Value, job_id: Uuid) -> Result<serde_json::Value>;
}

/// Handle for stopping a running `JobRunner` from another task.
#[derive(Clone)]
pub struct RunnerHandle {
    polling: Arc<AtomicBool>,
}

impl RunnerHandle {
    pub fn stop(&self) {
        self.polling.store(false, Ordering::SeqCst);
    }
}

/// Single-concurrency polling job runner.
pub struct JobRunner {
    queue: Arc<JobQueue>,
    processors: HashMap<String, Arc<dyn JobProcessor>>,
    poll_interval: Duration,
    retry_delay: Duration,
    polling: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(queue: Arc<JobQueue>, poll_interval: Duration, retry_delay: Duration) -> Self {
        Self {
            queue,
            processors: HashMap::new(),
            poll_interval,
            retry_delay,
            polling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a processor for a job type.
    pub fn register(&mut self, job_type: &str, processor: Arc<dyn JobProcessor>) {
        self.processors.insert(job_type.to_string(), processor);
    }

    /// Handle for stopping the runner.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            polling: self.polling.clone(),
        }
    }

    /// Run the polling loop until stopped.
    ///
    /// Recovers crashed jobs first: anything left in `running` by a
    /// previous process goes back to `pending`.
    pub async fn run(&self) -> Result<()> {
        self.queue.reset_running_jobs()?;

        self.polling.store(true, Ordering::SeqCst);
        info!("Job runner started");

        while self.polling.load(Ordering::SeqCst) {
            if let Err(e) = self.tick().await {
                error!("Error in job runner: {}", e);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!("Job runner stopped");
        Ok(())
    }

    /// Claim and execute at most one job.
    #[instrument(skip(self))]
    async fn tick(&self) -> Result<()> {
        let Some(job) = self.queue.claim_next()? else {
            return Ok(());
        };

        let Some(processor) = self.processors.get(&job.job_type) else {
            error!("No processor found for job type: {}", job.job_type);
            self.queue
                .fail_job(job.id, &format!("No processor found for job type: {}", job.job_type))?;
            return Ok(());
        };

        info!("Processing job {} of type {}", job.id, job.job_type);

        match processor.process(job.payload.clone(), job.id).await {
            Ok(result) => {
                self.queue.complete_job(job.id, &result)?;
            }
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                self.settle_failure(&job, &e)?;
            }
        }

        Ok(())
    }

    /// Decide between terminal failure and a delayed retry.
    fn settle_failure(&self, job: &Job, error: &crate::error::LydbokError) -> Result<()> {
        if error.is_permanent() || job.attempts >= job.max_attempts {
            self.queue.fail_job(job.id, &error.to_string())
        } else {
            let delay = job.delay_seconds.max(self.retry_delay.as_secs() as i64);
            self.queue
                .reschedule_job(job.id, &error.to_string(), delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::LydbokError;
    use crate::jobs::{JobOptions, JobStatus};
    use serde_json::json;

    struct OkProcessor;

    #[async_trait]
    impl JobProcessor for OkProcessor {
        async fn process(
            &self,
            payload: serde_json::Value,
            _job_id: Uuid,
        ) -> Result<serde_json::Value> {
            Ok(json!({ "echo": payload }))
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl JobProcessor for FailingProcessor {
        async fn process(
            &self,
            _payload: serde_json::Value,
            _job_id: Uuid,
        ) -> Result<serde_json::Value> {
            Err(LydbokError::Worker("always fails".into()))
        }
    }

    struct ConfigErrorProcessor;

    #[async_trait]
    impl JobProcessor for ConfigErrorProcessor {
        async fn process(
            &self,
            _payload: serde_json::Value,
            _job_id: Uuid,
        ) -> Result<serde_json::Value> {
            Err(LydbokError::Config("missing required parameters".into()))
        }
    }

    fn runner_with(processor: Arc<dyn JobProcessor>) -> (JobRunner, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::new(Arc::new(Database::in_memory().unwrap())));
        let mut runner = JobRunner::new(queue.clone(), Duration::from_millis(10), Duration::ZERO);
        runner.register("test", processor);
        (runner, queue)
    }

    #[tokio::test]
    async fn test_successful_job_completes() {
        let (runner, queue) = runner_with(Arc::new(OkProcessor));
        let id = queue.add("test", json!({"x": 1}), JobOptions::default()).unwrap();

        runner.tick().await.unwrap();

        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.result.unwrap().contains("echo"));
    }

    #[tokio::test]
    async fn test_bounded_retry_then_failure() {
        let (runner, queue) = runner_with(Arc::new(FailingProcessor));
        let id = queue
            .add(
                "test",
                json!({}),
                JobOptions { max_attempts: 2, delay_seconds: 0, ..Default::default() },
            )
            .unwrap();

        // First attempt: back to pending with error recorded.
        runner.tick().await.unwrap();
        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.error.is_some());

        // Second attempt: attempts reach max_attempts, terminal failure.
        runner.tick().await.unwrap();
        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert!(job.failed_at.is_some());
        assert!(job.error.unwrap().contains("always fails"));
    }

    #[tokio::test]
    async fn test_config_error_fails_immediately() {
        let (runner, queue) = runner_with(Arc::new(ConfigErrorProcessor));
        let id = queue
            .add(
                "test",
                json!({}),
                JobOptions { max_attempts: 5, ..Default::default() },
            )
            .unwrap();

        runner.tick().await.unwrap();

        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_type_fails() {
        let (runner, queue) = runner_with(Arc::new(OkProcessor));
        let id = queue.add("mystery", json!({}), JobOptions::default()).unwrap();

        runner.tick().await.unwrap();

        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("No processor"));
    }

    #[tokio::test]
    async fn test_one_job_per_tick() {
        let (runner, queue) = runner_with(Arc::new(OkProcessor));
        queue.add("test", json!({}), JobOptions::default()).unwrap();
        queue.add("test", json!({}), JobOptions::default()).unwrap();

        runner.tick().await.unwrap();

        let stats = queue.queue_stats().unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
    }
}
