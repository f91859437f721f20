//! Search command implementation.

use crate::cli::{format_timestamp, Output};
use crate::config::Settings;
use crate::context::AppContext;
use anyhow::Result;

/// Search a book's indexed transcript.
pub async fn run_search(
    book_id: &str,
    query: &str,
    limit: usize,
    no_expand: bool,
    settings: Settings,
) -> Result<()> {
    let ctx = AppContext::new(settings)?;

    // Guard against searching a book that was never vectorized.
    let book = ctx.books.require(book_id)?;
    if !book.vectorized {
        Output::warning(&format!(
            "Book {} has not been vectorized yet; results may be empty.",
            book_id
        ));
    }

    let results = if no_expand {
        ctx.index.search_similar(book_id, query, limit).await?
    } else {
        ctx.index
            .search_similar_with_expansion(book_id, query, limit)
            .await?
    };

    if results.is_empty() {
        Output::info("No results found.");
        return Ok(());
    }

    Output::header(&format!("Results for \"{}\"", query));
    for chunk in results {
        Output::search_result(
            &format!(
                "{} - {}",
                format_timestamp(chunk.start_time),
                format_timestamp(chunk.end_time)
            ),
            chunk.similarity,
            &chunk.document,
        );
    }

    Ok(())
}
