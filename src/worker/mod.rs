//! External worker process management.
//!
//! Transcription and audio filtering run as external child processes. The
//! spawner streams their stdout line-by-line to a caller-supplied callback
//! (progress parsing happens there), persists the child's OS pid on the
//! owning job row, and supports cancellation both in-process and from a
//! different process via the persisted pid.

pub mod progress;

use crate::error::{LydbokError, Result};
use crate::jobs::JobQueue;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Command line for one worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Short name used in log and error messages, e.g. "transcribe".
    pub label: String,
}

/// Spawns worker processes and tracks the running ones.
pub struct WorkerSpawner {
    queue: Arc<JobQueue>,
    running: Mutex<HashMap<Uuid, Child>>,
}

impl WorkerSpawner {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self {
            queue,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a worker, wait for it to exit, and return its full stdout.
    ///
    /// Each stdout line is also passed to `on_log` as it arrives. Stderr
    /// is buffered and included in the error when the worker exits
    /// non-zero. When `job_id` is given, the child's pid is persisted on
    /// the job row for the lifetime of the process.
    #[instrument(skip(self, command, on_log), fields(worker = %command.label))]
    pub async fn spawn<F>(
        &self,
        command: WorkerCommand,
        job_id: Option<Uuid>,
        mut on_log: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        info!("Spawning worker: {} {}", command.program, command.args.join(" "));

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LydbokError::ToolNotFound(command.program.clone())
                } else {
                    LydbokError::Io(e)
                }
            })?;

        if let (Some(job_id), Some(pid)) = (job_id, child.id()) {
            self.queue.set_pid(job_id, pid)?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LydbokError::Worker("Failed to capture worker stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LydbokError::Worker("Failed to capture worker stderr".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut buf).await;
            buf
        });

        // Register for cancellation before blocking on output. Workers
        // without a job still get a key so the wait path is uniform.
        let key = job_id.unwrap_or_else(Uuid::new_v4);
        self.running.lock().await.insert(key, child);

        let mut collected = String::new();
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "worker", "[{}] {}", command.label, line);
                    on_log(&line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Ok(None) => break,
                // Drop the child (kill_on_drop reaps it) and clear the
                // pid row before bailing out.
                Err(e) => {
                    self.running.lock().await.remove(&key);
                    if let Some(job_id) = job_id {
                        if let Err(e) = self.queue.clear_pid(job_id) {
                            warn!("Failed to clear pid for job {}: {}", job_id, e);
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        let status = match self.running.lock().await.remove(&key) {
            Some(mut child) => child.wait().await?,
            // Removed by a concurrent kill; treat as cancelled.
            None => {
                return Err(LydbokError::Worker(format!(
                    "{} worker was cancelled",
                    command.label
                )))
            }
        };

        if let Some(job_id) = job_id {
            self.queue.clear_pid(job_id)?;
        }

        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let tail: String = stderr_output
                .lines()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(LydbokError::ToolFailed(format!(
                "{} exited with {}: {}",
                command.label,
                status,
                tail.trim()
            )));
        }

        Ok(collected)
    }

    /// Kill the worker attached to a job.
    ///
    /// Prefers the in-memory child handle; falls back to signalling the
    /// persisted pid, which also covers workers started by a previous
    /// process. Returns whether anything was signalled.
    #[instrument(skip(self))]
    pub async fn kill(&self, job_id: Uuid) -> Result<bool> {
        {
            let mut running = self.running.lock().await;
            if let Some(mut child) = running.remove(&job_id) {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill worker for job {}: {}", job_id, e);
                }
                self.queue.clear_pid(job_id)?;
                return Ok(true);
            }
        }

        if let Some(pid) = self.queue.get_pid(job_id)? {
            let status = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .await?;
            self.queue.clear_pid(job_id)?;
            return Ok(status.success());
        }

        Ok(false)
    }

    /// Job ids with a worker currently running in this process.
    pub async fn running_jobs(&self) -> Vec<Uuid> {
        self.running.lock().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::JobOptions;
    use serde_json::json;

    fn spawner() -> (WorkerSpawner, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::new(Arc::new(Database::in_memory().unwrap())));
        (WorkerSpawner::new(queue.clone()), queue)
    }

    #[tokio::test]
    async fn test_spawn_streams_and_returns_stdout() {
        let (spawner, _queue) = spawner();
        let mut lines = Vec::new();
        let stdout = spawner
            .spawn(
                WorkerCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "echo one; echo two".into()],
                    label: "echo".into(),
                },
                None,
                |line| lines.push(line.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(stdout, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let (spawner, _queue) = spawner();
        let err = spawner
            .spawn(
                WorkerCommand {
                    program: "definitely-not-a-real-binary".into(),
                    args: vec![],
                    label: "missing".into(),
                },
                None,
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LydbokError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_spawn_failure_includes_stderr() {
        let (spawner, _queue) = spawner();
        let err = spawner
            .spawn(
                WorkerCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "echo broken >&2; exit 3".into()],
                    label: "failing".into(),
                },
                None,
                |_| {},
            )
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("failing"));
        assert!(msg.contains("broken"));
    }

    #[tokio::test]
    async fn test_pid_persisted_and_cleared() {
        let (spawner, queue) = spawner();
        let job_id = queue.add("test", json!({}), JobOptions::default()).unwrap();

        spawner
            .spawn(
                WorkerCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "true".into()],
                    label: "noop".into(),
                },
                Some(job_id),
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(queue.get_pid(job_id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stdout_read_error_cleans_up() {
        let (spawner, queue) = spawner();
        let job_id = queue.add("test", json!({}), JobOptions::default()).unwrap();

        // Invalid UTF-8 on stdout makes the line reader fail mid-stream.
        let err = spawner
            .spawn(
                WorkerCommand {
                    program: "sh".into(),
                    args: vec!["-c".into(), "printf '\\377\\376\\n'; sleep 5".into()],
                    label: "binary-output".into(),
                },
                Some(job_id),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LydbokError::Io(_)));
        assert!(spawner.running_jobs().await.is_empty());
        assert_eq!(queue.get_pid(job_id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_kill_with_no_worker_returns_false() {
        let (spawner, queue) = spawner();
        let job_id = queue.add("test", json!({}), JobOptions::default()).unwrap();
        assert!(!spawner.kill(job_id).await.unwrap());
    }
}
