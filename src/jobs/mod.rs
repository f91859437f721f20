//! Durable job queue and polling runner.
//!
//! Jobs are persisted rows claimed by a single-concurrency polling loop.
//! Long-running work (transcription, audio filtering) is delegated to
//! external worker processes, so the runner itself never needs to execute
//! more than one job at a time.

mod queue;
mod runner;

pub use queue::JobQueue;
pub use runner::{JobProcessor, JobRunner, RunnerHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted job record.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job ID.
    pub id: Uuid,
    /// Job type tag; determines which processor handles it.
    pub job_type: String,
    /// Opaque JSON payload interpreted only by the registered processor.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Number of times this job has been claimed.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Higher priority jobs are claimed first.
    pub priority: i64,
    /// Delay applied before each retry, in seconds.
    pub delay_seconds: i64,
    /// Earliest time this job is eligible to run.
    pub process_at: DateTime<Utc>,
    /// OS process id of an attached worker, if one is running.
    pub pid: Option<u32>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Options for enqueueing a job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub priority: i64,
    /// Delay before the first attempt (and between retries), in seconds.
    pub delay_seconds: i64,
    pub max_attempts: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay_seconds: 0,
            max_attempts: 3,
        }
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
}

/// Per-status job counts.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}
