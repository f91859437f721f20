//! Jobs command implementation: queue inspection and management.

use crate::cli::{JobsAction, Output};
use crate::config::Settings;
use crate::context::AppContext;
use crate::jobs::{JobFilter, JobStatus};
use anyhow::{Context, Result};
use uuid::Uuid;

/// Run a jobs subcommand.
pub async fn run_jobs(action: &JobsAction, settings: Settings) -> Result<()> {
    let ctx = AppContext::new(settings)?;

    match action {
        JobsAction::List { status, limit } => {
            let filter = JobFilter {
                status: status
                    .as_deref()
                    .map(|s| s.parse::<JobStatus>())
                    .transpose()
                    .map_err(|e| anyhow::anyhow!(e))?,
                job_type: None,
            };

            let jobs = ctx.queue.get_jobs(&filter, *limit, 0)?;
            if jobs.is_empty() {
                Output::info("No jobs found.");
                return Ok(());
            }

            Output::header("Jobs");
            for job in jobs {
                let mut line = format!(
                    "{} {} [{}] attempts {}/{}",
                    job.id, job.job_type, job.status, job.attempts, job.max_attempts
                );
                if let Some(error) = &job.error {
                    line.push_str(&format!(" - {}", error));
                }
                Output::list_item(&line);
            }
        }

        JobsAction::Stats => {
            let stats = ctx.queue.queue_stats()?;
            Output::header("Queue");
            Output::kv("pending", &stats.pending.to_string());
            Output::kv("running", &stats.running.to_string());
            Output::kv("completed", &stats.completed.to_string());
            Output::kv("failed", &stats.failed.to_string());
            Output::kv("total", &stats.total.to_string());
        }

        JobsAction::Retry { job_id } => {
            let id = parse_job_id(job_id)?;
            if ctx.queue.retry_job(id, 0)? {
                Output::success(&format!("Job {} queued for retry", id));
            } else {
                Output::warning("Only failed jobs can be retried.");
            }
        }

        JobsAction::Cancel { job_id } => {
            let id = parse_job_id(job_id)?;
            if ctx.spawner.kill(id).await? {
                Output::success(&format!("Signalled worker of job {}", id));
            } else {
                Output::warning(&format!("No running worker found for job {}", id));
            }
        }

        JobsAction::ClearCompleted => {
            let cleared = ctx.queue.clear_completed_jobs()?;
            Output::success(&format!("Removed {} completed job(s)", cleared));
        }

        JobsAction::ClearFailed => {
            let cleared = ctx.queue.clear_failed_jobs()?;
            Output::success(&format!("Removed {} failed job(s)", cleared));
        }
    }

    Ok(())
}

fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid job id: {}", raw))
}
