//! SQLite-based vector store implementation.
//!
//! Chunks live in the shared application database with cosine distance
//! computed in Rust. Collections are small (one audiobook's chunks), so a
//! full scan per query is fine; a dedicated vector extension would only
//! pay off at much larger scale.

use super::{cosine_distance, ChunkMetadata, QueryResponse, VectorStore};
use crate::db::Database;
use crate::error::{LydbokError, Result};
use async_trait::async_trait;
use rusqlite::params;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// SQLite-backed vector store.
pub struct SqliteVectorStore {
    db: Arc<Database>,
}

impl SqliteVectorStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, ids, documents, embeddings, metadatas), fields(count = ids.len()))]
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

        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;

        for i in 0..ids.len() {
            tx.execute(
                "INSERT OR REPLACE INTO vector_chunks
                     (collection, id, document, embedding, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    collection,
                    ids[i],
                    documents[i],
                    Self::embedding_to_bytes(&embeddings[i]),
                    metadatas[i].start_time,
                    metadatas[i].end_time,
                ],
            )?;
        }

        tx.commit()?;
        info!("Added {} chunks to collection {}", ids.len(), collection);
        Ok(())
    }

    #[instrument(skip(self, query_embedding))]
    async fn query(
        &self,
        collection: &str,
        query_embedding: &[f32],
        n_results: usize,
    ) -> Result<QueryResponse> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document, embedding, start_time, end_time
             FROM vector_chunks WHERE collection = ?1",
        )?;

        let rows = stmt.query_map([collection], |row| {
            let embedding_bytes: Vec<u8> = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                Self::bytes_to_embedding(&embedding_bytes),
                ChunkMetadata {
                    start_time: row.get(3)?,
                    end_time: row.get(4)?,
                },
            ))
        })?;

        let mut scored: Vec<(String, String, ChunkMetadata, f32)> = Vec::new();
        for row in rows {
            let (id, document, embedding, metadata) = row?;
            let distance = cosine_distance(query_embedding, &embedding);
            scored.push((id, document, metadata, distance));
        }

        scored.sort_by(|a, b| a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        let mut response = QueryResponse::default();
        for (id, document, metadata, distance) in scored {
            response.ids.push(id);
            response.documents.push(document);
            response.metadatas.push(metadata);
            response.distances.push(distance);
        }

        debug!("Found {} chunks in collection {}", response.ids.len(), collection);
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn clear_collection(&self, collection: &str) -> Result<usize> {
        let conn = self.db.conn()?;
        let deleted = conn.execute(
            "DELETE FROM vector_chunks WHERE collection = ?1",
            [collection],
        )?;
        Ok(deleted)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vector_chunks WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn meta(start: i64) -> ChunkMetadata {
        ChunkMetadata {
            start_time: start,
            end_time: start + 1000,
        }
    }

    #[test]
    fn test_embedding_roundtrip() {
        let embedding = vec![0.5, -1.25, 3.0];
        let bytes = SqliteVectorStore::embedding_to_bytes(&embedding);
        assert_eq!(SqliteVectorStore::bytes_to_embedding(&bytes), embedding);
    }

    #[tokio::test]
    async fn test_add_query_clear() {
        let store = store();
        store
            .add(
                "audiobook_b1",
                &["b1-0".into(), "b1-1".into()],
                &["first chunk".into(), "second chunk".into()],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                &[meta(0), meta(180_000)],
            )
            .await
            .unwrap();

        let response = store.query("audiobook_b1", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(response.documents, vec!["first chunk"]);
        assert_eq!(response.metadatas[0].start_time, 0);
        assert!(response.distances[0] < 0.001);

        assert_eq!(store.clear_collection("audiobook_b1").await.unwrap(), 2);
        assert_eq!(store.count("audiobook_b1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_is_upsert() {
        let store = store();
        for _ in 0..2 {
            store
                .add(
                    "c",
                    &["id-0".into()],
                    &["doc".into()],
                    &[vec![1.0]],
                    &[meta(0)],
                )
                .await
                .unwrap();
        }
        assert_eq!(store.count("c").await.unwrap(), 1);
    }
}
