//! Vector index over transcript chunks.
//!
//! Each book's chunks live in their own collection. Retrieval embeds the
//! query and ranks chunks by cosine similarity; when the direct query comes
//! back weak, the search is retried with the longest keywords of the query
//! and the results merged.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::TranscriptChunk;
use crate::embedding::Embedder;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Start of the chunk in milliseconds.
    pub start_time: i64,
    /// End of the chunk in milliseconds.
    pub end_time: i64,
}

/// Raw query result as parallel arrays, ordered by ascending distance.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
}

/// Trait for vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add chunks to a collection. All slices must have equal length.
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<()>;

    /// Query a collection for the nearest chunks.
    async fn query(
        &self,
        collection: &str,
        query_embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse>;

    /// Remove every chunk in a collection, returning how many were removed.
    async fn clear_collection(&self, collection: &str) -> Result<usize>;

    /// Number of chunks in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance, the store-level ordering key.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// One retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub document: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Cosine similarity to the query, higher is better.
    pub similarity: f32,
}

/// Results below this similarity trigger query expansion.
const EXPANSION_THRESHOLD: f32 = 0.5;
/// Number of keywords tried during expansion.
const MAX_EXPANSION_TERMS: usize = 3;
/// Keywords this short carry too little meaning to expand on.
const MIN_TERM_LEN: usize = 4;

/// High-level retrieval interface combining an embedder and a store.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Collection holding a book's chunks.
    pub fn collection_name(book_id: &str) -> String {
        format!("audiobook_{}", book_id)
    }

    /// Embed and add chunks to a book's collection.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub async fn add_chunks(&self, book_id: &str, chunks: &[TranscriptChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let ids: Vec<String> = (0..chunks.len())
            .map(|i| format!("{}-{}", book_id, i))
            .collect();
        let metadatas: Vec<ChunkMetadata> = chunks
            .iter()
            .map(|c| ChunkMetadata {
                start_time: c.start_time,
                end_time: c.end_time,
            })
            .collect();

        let collection = Self::collection_name(book_id);
        self.store
            .add(&collection, &ids, &texts, &embeddings, &metadatas)
            .await?;

        info!("Indexed {} chunks for book {}", chunks.len(), book_id);
        Ok(())
    }

    /// Replace a book's collection with the given chunks.
    pub async fn rebuild(&self, book_id: &str, chunks: &[TranscriptChunk]) -> Result<()> {
        let collection = Self::collection_name(book_id);
        let cleared = self.store.clear_collection(&collection).await?;
        if cleared > 0 {
            debug!("Cleared {} stale chunks for book {}", cleared, book_id);
        }
        self.add_chunks(book_id, chunks).await
    }

    /// Number of indexed chunks for a book.
    pub async fn chunk_count(&self, book_id: &str) -> Result<usize> {
        self.store.count(&Self::collection_name(book_id)).await
    }

    /// Remove a book's collection.
    pub async fn clear(&self, book_id: &str) -> Result<usize> {
        self.store
            .clear_collection(&Self::collection_name(book_id))
            .await
    }

    /// Find the chunks most similar to a query.
    #[instrument(skip(self))]
    pub async fn search_similar(
        &self,
        book_id: &str,
        query: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;
        let response = self
            .store
            .query(&Self::collection_name(book_id), &embedding, n_results)
            .await?;
        Ok(response_to_chunks(response))
    }

    /// Search with keyword expansion as a fallback.
    ///
    /// When the direct query returns nothing, or its best hit is below the
    /// expansion threshold, the longest keywords of the query are searched
    /// individually and the results merged, keeping the first hit per
    /// timestamp.
    #[instrument(skip(self))]
    pub async fn search_similar_with_expansion(
        &self,
        book_id: &str,
        query: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let direct = self.search_similar(book_id, query, n_results).await?;

        let weak = direct.is_empty()
            || direct
                .first()
                .map(|c| c.similarity < EXPANSION_THRESHOLD)
                .unwrap_or(true);
        if !weak {
            return Ok(direct);
        }

        let terms = expansion_terms(query);
        if terms.is_empty() {
            return Ok(direct);
        }
        debug!("Expanding query with terms: {:?}", terms);

        let mut merged = direct;
        for term in terms {
            let hits = self.search_similar(book_id, &term, n_results).await?;
            merged.extend(hits);
        }

        // Direct results stay ahead of expansion results; the first hit
        // per timestamp wins.
        let mut seen = std::collections::HashSet::new();
        merged.retain(|c| seen.insert(c.start_time));
        merged.truncate(n_results);
        Ok(merged)
    }
}

/// The longest keywords of a query, for expansion.
fn expansion_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.len() >= MIN_TERM_LEN)
        .collect();

    // Stable sort keeps query order among equal-length terms.
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
    terms.truncate(MAX_EXPANSION_TERMS);
    terms
}

fn response_to_chunks(response: QueryResponse) -> Vec<ScoredChunk> {
    response
        .documents
        .into_iter()
        .zip(response.metadatas)
        .zip(response.distances)
        .map(|((document, meta), distance)| ScoredChunk {
            document,
            start_time: meta.start_time,
            end_time: meta.end_time,
            similarity: 1.0 - distance,
        })
        .collect()
}
