//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets. Data is lost when dropped.

use super::{cosine_distance, ChunkMetadata, QueryResponse, VectorStore};
use crate::error::{LydbokError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

struct StoredChunk {
    id: String,
    document: String,
    embedding: Vec<f32>,
    metadata: ChunkMetadata,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        if ids.len() != documents.len()
            || ids.len() != embeddings.len()
            || ids.len() != metadatas.len()
        {
            return Err(LydbokError::VectorStore(
                "Mismatched lengths in add request".to_string(),
            ));
        }

        let mut collections = self
            .collections
            .write()
            .map_err(|e| LydbokError::VectorStore(format!("Failed to acquire lock: {}", e)))?;

        let chunks = collections.entry(collection.to_string()).or_default();
        for i in 0..ids.len() {
            chunks.push(StoredChunk {
                id: ids[i].clone(),
                document: documents[i].clone(),
                embedding: embeddings[i].clone(),
                metadata: metadatas[i],
            });
        }

        debug!("Added {} chunks to collection {}", ids.len(), collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse> {
        let collections = self
            .collections
            .read()
            .map_err(|e| LydbokError::VectorStore(format!("Failed to acquire lock: {}", e)))?;

        let Some(chunks) = collections.get(collection) else {
            return Ok(QueryResponse::default());
        };

        let mut scored: Vec<(&StoredChunk, f32)> = chunks
            .iter()
            .map(|c| (c, cosine_distance(query_embedding, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        let mut response = QueryResponse::default();
        for (chunk, distance) in scored {
            response.ids.push(chunk.id.clone());
            response.documents.push(chunk.document.clone());
            response.metadatas.push(chunk.metadata);
            response.distances.push(distance);
        }
        Ok(response)
    }

    async fn clear_collection(&self, collection: &str) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| LydbokError::VectorStore(format!("Failed to acquire lock: {}", e)))?;

        Ok(collections.remove(collection).map(|c| c.len()).unwrap_or(0))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| LydbokError::VectorStore(format!("Failed to acquire lock: {}", e)))?;

        Ok(collections.get(collection).map(|c| c.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(start: i64) -> ChunkMetadata {
        ChunkMetadata {
            start_time: start,
            end_time: start + 1000,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let store = MemoryVectorStore::new();
        store
            .add(
                "c",
                &["a".into(), "b".into()],
                &["far".into(), "near".into()],
                &[vec![0.0, 1.0], vec![1.0, 0.0]],
                &[meta(0), meta(1000)],
            )
            .await
            .unwrap();

        let response = store.query("c", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(response.documents, vec!["near", "far"]);
        assert!(response.distances[0] < response.distances[1]);
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_empty() {
        let store = MemoryVectorStore::new();
        let response = store.query("nope", &[1.0], 10).await.unwrap();
        assert!(response.ids.is_empty());
    }

    #[tokio::test]
    async fn test_clear_collection() {
        let store = MemoryVectorStore::new();
        store
            .add("c", &["a".into()], &["doc".into()], &[vec![1.0]], &[meta(0)])
            .await
            .unwrap();

        assert_eq!(store.clear_collection("c").await.unwrap(), 1);
        assert_eq!(store.count("c").await.unwrap(), 0);
        assert_eq!(store.clear_collection("c").await.unwrap(), 0);
    }
}
