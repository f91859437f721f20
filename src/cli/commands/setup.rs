//! Setup command implementation: enqueue a setup job.

use crate::cli::Output;
use crate::config::Settings;
use crate::context::AppContext;
use crate::jobs::JobOptions;
use crate::library::Stage;
use crate::pipeline::{SetupJobPayload, StageRequest, SETUP_JOB_TYPE};
use anyhow::Result;

/// Enqueue a setup job for a registered book.
pub async fn run_setup(
    book_id: &str,
    model: &str,
    stages: &[String],
    force: bool,
    priority: i64,
    settings: Settings,
) -> Result<()> {
    let ctx = AppContext::new(settings)?;

    // Fail here rather than in the job when the book does not exist.
    ctx.books.require(book_id)?;

    let requested: Vec<StageRequest> = if stages.is_empty() {
        if force {
            Stage::ALL
                .iter()
                .map(|stage| StageRequest {
                    stage: *stage,
                    force: true,
                })
                .collect()
        } else {
            Vec::new()
        }
    } else {
        stages
            .iter()
            .map(|s| {
                s.parse().map(|stage| StageRequest { stage, force })
            })
            .collect::<crate::error::Result<_>>()?
    };

    let payload = SetupJobPayload {
        book_id: book_id.to_string(),
        model: model.to_string(),
        stages: requested,
    };

    let job_id = ctx.queue.add(
        SETUP_JOB_TYPE,
        serde_json::to_value(&payload)?,
        JobOptions {
            priority,
            delay_seconds: 0,
            max_attempts: ctx.settings.queue.max_attempts,
        },
    )?;

    Output::success(&format!("Enqueued setup job {} for {}", job_id, book_id));
    Output::info("Start 'lydbok run' to process the queue.");
    Ok(())
}
