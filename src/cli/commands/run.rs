//! Run command implementation: the job runner loop.

use crate::cli::Output;
use crate::config::Settings;
use crate::context::AppContext;
use crate::jobs::JobRunner;
use crate::pipeline::{SetupProcessor, SETUP_JOB_TYPE};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Run the job runner until Ctrl-C.
pub async fn run_run(settings: Settings) -> Result<()> {
    let ctx = AppContext::new(settings)?;

    let mut runner = JobRunner::new(
        ctx.queue.clone(),
        Duration::from_millis(ctx.settings.queue.poll_interval_ms),
        Duration::from_secs(u64::from(ctx.settings.queue.retry_delay_seconds)),
    );
    runner.register(
        SETUP_JOB_TYPE,
        Arc::new(SetupProcessor::new(ctx.setup_pipeline())),
    );

    let handle = runner.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            Output::info("Shutting down after current job...");
            handle.stop();
        }
    });

    Output::info("Job runner started. Press Ctrl-C to stop.");
    runner.run().await?;
    Output::success("Job runner stopped.");
    Ok(())
}
