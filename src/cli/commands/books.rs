//! Book management commands: add, books, status.

use crate::cli::Output;
use crate::config::Settings;
use crate::context::AppContext;
use crate::library::{BookFile, Stage};
use anyhow::{Context, Result};

/// Register a book from a manifest file.
///
/// The manifest is a JSON array of `{ "path": ..., "download_url": ... }`
/// entries, one per source file.
pub async fn run_add(
    book_id: &str,
    title: &str,
    manifest: &str,
    duration_ms: i64,
    settings: Settings,
) -> Result<()> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest))?;
    let files: Vec<BookFile> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid manifest {}", manifest))?;

    let ctx = AppContext::new(settings)?;
    ctx.books.register(book_id, title, duration_ms, &files)?;

    Output::success(&format!(
        "Registered '{}' ({}) with {} file(s)",
        title,
        book_id,
        files.len()
    ));
    Ok(())
}

/// List registered books.
pub async fn run_books(settings: Settings) -> Result<()> {
    let ctx = AppContext::new(settings)?;
    let books = ctx.books.list()?;

    if books.is_empty() {
        Output::info("No books registered yet. Use 'lydbok add' to register one.");
        return Ok(());
    }

    Output::header("Books");
    for book in books {
        let state = if book.setup { "ready" } else { "not set up" };
        Output::list_item(&format!("{} ({}) - {}", book.title, book.id, state));
    }
    Ok(())
}

/// Show one book's setup state and stage progress.
pub async fn run_status(book_id: &str, settings: Settings) -> Result<()> {
    let ctx = AppContext::new(settings)?;
    let book = ctx.books.require(book_id)?;

    Output::header(&book.title);
    Output::kv("id", &book.id);
    if let Some(model) = &book.model {
        Output::kv("model", model);
    }
    Output::kv("files", &book.files.len().to_string());
    Output::kv("setup", if book.setup { "yes" } else { "no" });

    Output::header("Stages");
    for stage in Stage::ALL {
        let line = match ctx.tracker.get(&book.id, stage)? {
            Some(progress) => {
                let mut line = format!(
                    "{}: {} ({:.1}%)",
                    stage,
                    progress.status.as_str(),
                    progress.progress
                );
                if let Some(error) = &progress.error {
                    line.push_str(&format!(" - {}", error));
                }
                line
            }
            None => format!(
                "{}: {}",
                stage,
                if book.stage_done(stage) { "completed" } else { "pending" }
            ),
        };
        Output::list_item(&line);
    }

    let segments = ctx.segments.count(&book.id)?;
    let chunks = ctx.index.chunk_count(&book.id).await?;
    Output::header("Index");
    Output::kv("transcript segments", &segments.to_string());
    Output::kv("indexed chunks", &chunks.to_string());

    Ok(())
}
