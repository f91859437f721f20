//! SQLite-backed durable job queue.

use super::{Job, JobFilter, JobOptions, JobStatus, QueueStats};
use crate::db::Database;
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Row};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Durable, poll-based job queue.
pub struct JobQueue {
    db: Arc<Database>,
}

impl JobQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Enqueue a new job. Returns the job id.
    #[instrument(skip(self, payload))]
    pub fn add(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<Uuid> {
        let conn = self.db.conn()?;

        let id = Uuid::new_v4();
        let now = Utc::now().timestamp_millis();
        let process_at = now + options.delay_seconds * 1000;

        conn.execute(
            r#"
            INSERT INTO jobs
            (id, type, payload, status, attempts, max_attempts, priority,
             delay_seconds, process_at, created_at)
            VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                id.to_string(),
                job_type,
                payload.to_string(),
                options.max_attempts,
                options.priority,
                options.delay_seconds,
                process_at,
                now,
            ],
        )?;

        info!("Job {} queued for {}", id, job_type);
        Ok(id)
    }

    /// Fetch a single job by id.
    pub fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.db.conn()?;

        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id.to_string()],
                row_to_job,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(job)
    }

    /// List jobs matching a filter, newest first.
    pub fn get_jobs(&self, filter: &JobFilter, limit: usize, offset: usize) -> Result<Vec<Job>> {
        let conn = self.db.conn()?;

        let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", JOB_COLUMNS);
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(job_type) = &filter.job_type {
            sql.push_str(" AND type = ?");
            args.push(Box::new(job_type.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
        args.push(Box::new(limit as i64));
        args.push(Box::new(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let jobs = stmt.query_map(params.as_slice(), row_to_job)?;

        Ok(jobs.filter_map(|j| j.ok()).collect())
    }

    /// Claim the next eligible pending job: highest priority first, then
    /// oldest created. The transition to `running` is a single conditional
    /// update so a concurrent claimer cannot take the same job.
    pub fn claim_next(&self) -> Result<Option<Job>> {
        let conn = self.db.conn()?;
        let now = Utc::now().timestamp_millis();

        let candidate: Option<String> = conn
            .query_row(
                r#"
                SELECT id FROM jobs
                WHERE status = 'pending' AND process_at <= ?1
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                "#,
                params![now],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let updated = conn.execute(
            r#"
            UPDATE jobs SET status = 'running', attempts = attempts + 1
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![id],
        )?;

        if updated != 1 {
            // Lost the claim race; the next tick will try again.
            return Ok(None);
        }

        let job = conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            row_to_job,
        )?;

        debug!("Claimed job {} (attempt {})", job.id, job.attempts);
        Ok(Some(job))
    }

    /// Mark a job completed with its result.
    pub fn complete_job(&self, id: Uuid, result: &serde_json::Value) -> Result<()> {
        let conn = self.db.conn()?;

        conn.execute(
            r#"
            UPDATE jobs SET status = 'completed', result = ?2, completed_at = ?3
            WHERE id = ?1
            "#,
            params![id.to_string(), result.to_string(), Utc::now().timestamp_millis()],
        )?;

        info!("Job {} completed", id);
        Ok(())
    }

    /// Mark a job failed permanently.
    pub fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        let conn = self.db.conn()?;

        conn.execute(
            r#"
            UPDATE jobs SET status = 'failed', error = ?2, failed_at = ?3
            WHERE id = ?1
            "#,
            params![id.to_string(), error, Utc::now().timestamp_millis()],
        )?;

        info!("Job {} failed: {}", id, error);
        Ok(())
    }

    /// Return a job to `pending` for a later retry, recording the error.
    pub fn reschedule_job(&self, id: Uuid, error: &str, delay_seconds: i64) -> Result<()> {
        let conn = self.db.conn()?;
        let process_at = Utc::now().timestamp_millis() + delay_seconds * 1000;

        conn.execute(
            r#"
            UPDATE jobs SET status = 'pending', error = ?2, process_at = ?3
            WHERE id = ?1
            "#,
            params![id.to_string(), error, process_at],
        )?;

        info!("Job {} will be retried in {}s", id, delay_seconds);
        Ok(())
    }

    /// Re-arm a failed job. Only valid from `failed`; resets attempts and
    /// clears the recorded error. Returns false if the job was not failed.
    #[instrument(skip(self))]
    pub fn retry_job(&self, id: Uuid, delay_seconds: i64) -> Result<bool> {
        let conn = self.db.conn()?;
        let process_at = Utc::now().timestamp_millis() + delay_seconds * 1000;

        let updated = conn.execute(
            r#"
            UPDATE jobs
            SET status = 'pending', attempts = 0, error = NULL, failed_at = NULL,
                process_at = ?2
            WHERE id = ?1 AND status = 'failed'
            "#,
            params![id.to_string(), process_at],
        )?;

        if updated == 1 {
            info!("Job {} queued for retry", id);
        }
        Ok(updated == 1)
    }

    /// Delete a job by id. Returns false if it did not exist.
    pub fn delete_job(&self, id: Uuid) -> Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted == 1)
    }

    /// Bulk delete completed jobs; returns the count removed.
    pub fn clear_completed_jobs(&self) -> Result<usize> {
        let conn = self.db.conn()?;
        let count = conn.execute("DELETE FROM jobs WHERE status = 'completed'", [])?;
        info!("Cleared {} completed jobs", count);
        Ok(count)
    }

    /// Bulk delete failed jobs; returns the count removed.
    pub fn clear_failed_jobs(&self) -> Result<usize> {
        let conn = self.db.conn()?;
        let count = conn.execute("DELETE FROM jobs WHERE status = 'failed'", [])?;
        info!("Cleared {} failed jobs", count);
        Ok(count)
    }

    /// Crash recovery, called once at runner startup. Any job stranded in
    /// `running` by a dead process is forced back to `pending` with its
    /// attempts reset, so a crash can never permanently wedge a job.
    pub fn reset_running_jobs(&self) -> Result<usize> {
        let conn = self.db.conn()?;

        let count = conn.execute(
            r#"
            UPDATE jobs
            SET status = 'pending', process_at = ?1, attempts = 0,
                error = NULL, failed_at = NULL
            WHERE status = 'running'
            "#,
            params![Utc::now().timestamp_millis()],
        )?;

        if count > 0 {
            info!("Reset {} running jobs to pending", count);
        }
        Ok(count)
    }

    /// Per-status counts.
    pub fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.db.conn()?;

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((status, count))
        })?;

        let mut stats = QueueStats {
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            total: 0,
        };

        for row in rows.filter_map(|r| r.ok()) {
            match row.0.as_str() {
                "pending" => stats.pending = row.1,
                "running" => stats.running = row.1,
                "completed" => stats.completed = row.1,
                "failed" => stats.failed = row.1,
                _ => {}
            }
        }
        stats.total = stats.pending + stats.running + stats.completed + stats.failed;

        Ok(stats)
    }

    /// Persist the OS pid of a worker attached to this job, enabling
    /// cross-process cancellation.
    pub fn set_pid(&self, id: Uuid, pid: u32) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE jobs SET pid = ?2 WHERE id = ?1",
            params![id.to_string(), pid],
        )?;
        Ok(())
    }

    /// Clear the worker pid. Done on worker exit so a stale pid is never
    /// signalled after the OS reuses it.
    pub fn clear_pid(&self, id: Uuid) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE jobs SET pid = NULL WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    /// Read the attached worker pid, if any.
    pub fn get_pid(&self, id: Uuid) -> Result<Option<u32>> {
        let conn = self.db.conn()?;

        let pid = conn
            .query_row(
                "SELECT pid FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, Option<u32>>(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(pid)
    }
}

const JOB_COLUMNS: &str = "id, type, payload, status, attempts, max_attempts, priority, \
     delay_seconds, process_at, pid, result, error, created_at, completed_at, failed_at";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id_str: String = row.get(0)?;
    let payload_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;

    Ok(Job {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        job_type: row.get(1)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Pending),
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        priority: row.get(6)?,
        delay_seconds: row.get(7)?,
        process_at: millis_to_datetime(row.get(8)?),
        pid: row.get(9)?,
        result: row.get(10)?,
        error: row.get(11)?,
        created_at: millis_to_datetime(row.get(12)?),
        completed_at: row.get::<_, Option<i64>>(13)?.map(millis_to_datetime),
        failed_at: row.get::<_, Option<i64>>(14)?.map(millis_to_datetime),
    })
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_add_and_get() {
        let queue = queue();
        let id = queue
            .add("setup_book", json!({"book_id": "b1"}), JobOptions::default())
            .unwrap();

        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.job_type, "setup_book");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.payload["book_id"], "b1");
    }

    #[test]
    fn test_claim_increments_attempts() {
        let queue = queue();
        let id = queue.add("t", json!({}), JobOptions::default()).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);

        // A running job cannot be claimed again.
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_claim_respects_priority_then_age() {
        let queue = queue();
        let _low = queue
            .add("t", json!({"n": 1}), JobOptions { priority: 0, ..Default::default() })
            .unwrap();
        let high = queue
            .add("t", json!({"n": 2}), JobOptions { priority: 5, ..Default::default() })
            .unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, high);
    }

    #[test]
    fn test_delayed_job_not_claimable() {
        let queue = queue();
        queue
            .add(
                "t",
                json!({}),
                JobOptions { delay_seconds: 3600, ..Default::default() },
            )
            .unwrap();

        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_retry_job_only_from_failed() {
        let queue = queue();
        let id = queue.add("t", json!({}), JobOptions::default()).unwrap();

        // Pending jobs are not retryable.
        assert!(!queue.retry_job(id, 0).unwrap());

        queue.claim_next().unwrap();
        queue.fail_job(id, "boom").unwrap();
        assert!(queue.retry_job(id, 0).unwrap());

        let job = queue.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.error.is_none());
        assert!(job.failed_at.is_none());
    }

    #[test]
    fn test_reset_running_jobs() {
        let queue = queue();
        let a = queue.add("t", json!({}), JobOptions::default()).unwrap();
        let b = queue.add("t", json!({}), JobOptions::default()).unwrap();

        queue.claim_next().unwrap();

        let reset = queue.reset_running_jobs().unwrap();
        assert_eq!(reset, 1);

        for id in [a, b] {
            let job = queue.get_job(id).unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.attempts, 0);
        }
    }

    #[test]
    fn test_clear_by_status() {
        let queue = queue();
        let a = queue.add("t", json!({}), JobOptions::default()).unwrap();
        let b = queue.add("t", json!({}), JobOptions::default()).unwrap();

        queue.claim_next().unwrap();
        queue.complete_job(a, &json!("ok")).unwrap();
        queue.claim_next().unwrap();
        queue.fail_job(b, "bad").unwrap();

        assert_eq!(queue.clear_completed_jobs().unwrap(), 1);
        assert_eq!(queue.clear_failed_jobs().unwrap(), 1);

        let stats = queue.queue_stats().unwrap();
        assert_eq!(stats.total, 0);
    }

    #[test]
    fn test_queue_stats() {
        let queue = queue();
        queue.add("t", json!({}), JobOptions::default()).unwrap();
        queue.add("t", json!({}), JobOptions::default()).unwrap();
        queue.claim_next().unwrap();

        let stats = queue.queue_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_pid_lifecycle() {
        let queue = queue();
        let id = queue.add("t", json!({}), JobOptions::default()).unwrap();

        assert_eq!(queue.get_pid(id).unwrap(), None);
        queue.set_pid(id, 4321).unwrap();
        assert_eq!(queue.get_pid(id).unwrap(), Some(4321));
        queue.clear_pid(id).unwrap();
        assert_eq!(queue.get_pid(id).unwrap(), None);
    }

    #[test]
    fn test_get_jobs_filter() {
        let queue = queue();
        queue.add("alpha", json!({}), JobOptions::default()).unwrap();
        queue.add("beta", json!({}), JobOptions::default()).unwrap();

        let filter = JobFilter {
            job_type: Some("alpha".to_string()),
            ..Default::default()
        };
        let jobs = queue.get_jobs(&filter, 100, 0).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, "alpha");
    }
}
