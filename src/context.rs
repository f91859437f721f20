//! Shared application context.
//!
//! All components hang off one context built at startup: a single database
//! handle, one queue, one spawner, and so on. Commands and processors take
//! what they need from here instead of opening their own connections.

use crate::cache::TranscriptionCache;
use crate::config::Settings;
use crate::db::Database;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::Result;
use crate::jobs::JobQueue;
use crate::library::BookStore;
use crate::pipeline::{SetupPipeline, StageTracker};
use crate::transcription::SegmentStore;
use crate::vector_index::{SqliteVectorStore, VectorIndex};
use crate::worker::WorkerSpawner;
use std::sync::Arc;

/// Shared application context.
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub db: Arc<Database>,
    pub queue: Arc<JobQueue>,
    pub books: Arc<BookStore>,
    pub tracker: Arc<StageTracker>,
    pub segments: Arc<SegmentStore>,
    pub spawner: Arc<WorkerSpawner>,
    pub index: Arc<VectorIndex>,
    pub cache: Arc<TranscriptionCache>,
    pub http: reqwest::Client,
}

impl AppContext {
    /// Build a context from settings, opening the database on disk.
    pub fn new(settings: Settings) -> Result<Self> {
        let db = Arc::new(Database::open(&settings.database_path())?);
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(&settings.embedding)?);
        Self::with_parts(settings, db, embedder)
    }

    /// Build a context around an existing database and embedder. Tests use
    /// this with an in-memory database.
    pub fn with_parts(
        settings: Settings,
        db: Arc<Database>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let settings = Arc::new(settings);
        let queue = Arc::new(JobQueue::new(db.clone()));
        let books = Arc::new(BookStore::new(db.clone()));
        let tracker = Arc::new(StageTracker::new(db.clone()));
        let segments = Arc::new(SegmentStore::new(db.clone()));
        let spawner = Arc::new(WorkerSpawner::new(queue.clone()));
        let store = Arc::new(SqliteVectorStore::new(db.clone()));
        let index = Arc::new(VectorIndex::new(store, embedder));
        let cache = Arc::new(TranscriptionCache::new(settings.transcription_cache_dir()));
        let http = reqwest::Client::new();

        Ok(Self {
            settings,
            db,
            queue,
            books,
            tracker,
            segments,
            spawner,
            index,
            cache,
            http,
        })
    }

    /// Assemble the setup pipeline over this context.
    pub fn setup_pipeline(&self) -> Arc<SetupPipeline> {
        Arc::new(SetupPipeline::new(
            self.settings.clone(),
            self.books.clone(),
            self.tracker.clone(),
            self.segments.clone(),
            self.spawner.clone(),
            self.index.clone(),
            self.cache.clone(),
            self.http.clone(),
        ))
    }
}
