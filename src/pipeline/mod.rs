//! Audiobook setup pipeline.
//!
//! Setup takes a registered book through download, audio processing,
//! transcription and vectorization. Each stage is skippable when its
//! completion flag is already set, re-runnable with `force`, and tracked
//! through the stage progress table. A stage failure aborts the remaining
//! stages and fails the owning job.

pub mod progress;
mod stages;

pub use progress::{StageProgress, StageStatus, StageTracker};

use crate::cache::TranscriptionCache;
use crate::config::Settings;
use crate::error::{LydbokError, Result};
use crate::jobs::JobProcessor;
use crate::library::{BookStore, Stage};
use crate::transcription::SegmentStore;
use crate::vector_index::VectorIndex;
use crate::worker::WorkerSpawner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Job type handled by the setup processor.
pub const SETUP_JOB_TYPE: &str = "setup_book";

/// One requested stage of a setup run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageRequest {
    pub stage: Stage,
    /// Re-run the stage even when its completion flag is set.
    #[serde(default)]
    pub force: bool,
}

/// Payload of a setup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupJobPayload {
    pub book_id: String,
    /// Transcription model for the run.
    pub model: String,
    /// Stages to run. Empty means every stage.
    #[serde(default)]
    pub stages: Vec<StageRequest>,
}

/// Outcome of a setup run, stored as the job result.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupOutcome {
    pub book_id: String,
    pub completed: Vec<Stage>,
    pub skipped: Vec<Stage>,
}

/// Runs the setup stages for a book.
pub struct SetupPipeline {
    pub(crate) settings: Arc<Settings>,
    pub(crate) books: Arc<BookStore>,
    pub(crate) tracker: Arc<StageTracker>,
    pub(crate) segments: Arc<SegmentStore>,
    pub(crate) spawner: Arc<WorkerSpawner>,
    pub(crate) index: Arc<VectorIndex>,
    pub(crate) cache: Arc<TranscriptionCache>,
    pub(crate) http: reqwest::Client,
}

impl SetupPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        books: Arc<BookStore>,
        tracker: Arc<StageTracker>,
        segments: Arc<SegmentStore>,
        spawner: Arc<WorkerSpawner>,
        index: Arc<VectorIndex>,
        cache: Arc<TranscriptionCache>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            books,
            tracker,
            segments,
            spawner,
            index,
            cache,
            http,
        }
    }

    /// Run setup for a book.
    ///
    /// The book's overall setup flag is set only when every requested
    /// stage has either completed in this run or was validly skipped.
    #[instrument(skip(self, payload), fields(book_id = %payload.book_id))]
    pub async fn run(&self, payload: &SetupJobPayload, job_id: Uuid) -> Result<SetupOutcome> {
        if payload.book_id.is_empty() || payload.model.is_empty() {
            return Err(LydbokError::Config(
                "Setup job requires book_id and model".to_string(),
            ));
        }

        self.books.begin_setup(&payload.book_id, &payload.model)?;

        let plan = plan_stages(&payload.stages);
        let mut outcome = SetupOutcome {
            book_id: payload.book_id.clone(),
            completed: Vec::new(),
            skipped: Vec::new(),
        };

        for request in plan {
            // Refetch so flags set by earlier stages are visible.
            let book = self.books.require(&payload.book_id)?;

            if book.stage_done(request.stage) && !request.force {
                info!("Skipping completed stage {} for {}", request.stage, book.id);
                outcome.skipped.push(request.stage);
                continue;
            }

            self.tracker.reset(&book.id, request.stage)?;
            info!("Running stage {} for {}", request.stage, book.id);

            let result = match request.stage {
                Stage::Download => self.run_download(&book).await,
                Stage::ProcessAudio => self.run_process_audio(&book, job_id).await,
                Stage::Transcribe => self.run_transcribe(&book, &payload.model, job_id).await,
                Stage::Vectorize => self.run_vectorize(&book).await,
            };

            match result {
                Ok(()) => {
                    self.tracker.complete(&book.id, request.stage)?;
                    outcome.completed.push(request.stage);
                }
                Err(e) => {
                    warn!("Stage {} failed for {}: {}", request.stage, book.id, e);
                    self.tracker.fail(&book.id, request.stage, &e.to_string())?;
                    return Err(e);
                }
            }
        }

        self.books.set_setup(&payload.book_id, true)?;
        info!("Setup complete for {}", payload.book_id);
        Ok(outcome)
    }
}

/// Normalize stage requests into canonical execution order.
///
/// Duplicates collapse to one entry that is forced if any duplicate was;
/// an empty request list means every stage.
fn plan_stages(requests: &[StageRequest]) -> Vec<StageRequest> {
    if requests.is_empty() {
        return Stage::ALL
            .iter()
            .map(|stage| StageRequest {
                stage: *stage,
                force: false,
            })
            .collect();
    }

    Stage::ALL
        .iter()
        .filter_map(|stage| {
            let matching: Vec<_> = requests.iter().filter(|r| r.stage == *stage).collect();
            if matching.is_empty() {
                None
            } else {
                Some(StageRequest {
                    stage: *stage,
                    force: matching.iter().any(|r| r.force),
                })
            }
        })
        .collect()
}

/// Job processor wrapping the setup pipeline.
pub struct SetupProcessor {
    pipeline: Arc<SetupPipeline>,
}

impl SetupProcessor {
    pub fn new(pipeline: Arc<SetupPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobProcessor for SetupProcessor {
    async fn process(&self, payload: serde_json::Value, job_id: Uuid) -> Result<serde_json::Value> {
        let payload: SetupJobPayload = serde_json::from_value(payload)
            .map_err(|e| LydbokError::Config(format!("Invalid setup payload: {}", e)))?;
        let outcome = self.pipeline.run(&payload, job_id).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::embedding::Embedder;
    use crate::jobs::JobQueue;
    use crate::vector_index::MemoryVectorStore;

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn pipeline() -> (SetupPipeline, Arc<BookStore>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let books = Arc::new(BookStore::new(db.clone()));
        let queue = Arc::new(JobQueue::new(db.clone()));
        let temp = tempfile::tempdir().unwrap().into_path();
        let pipeline = SetupPipeline::new(
            Arc::new(Settings::default()),
            books.clone(),
            Arc::new(StageTracker::new(db.clone())),
            Arc::new(SegmentStore::new(db.clone())),
            Arc::new(WorkerSpawner::new(queue)),
            Arc::new(VectorIndex::new(
                Arc::new(MemoryVectorStore::new()),
                Arc::new(ZeroEmbedder),
            )),
            Arc::new(TranscriptionCache::new(temp)),
            reqwest::Client::new(),
        );
        (pipeline, books)
    }

    fn payload(stages: Vec<StageRequest>) -> SetupJobPayload {
        SetupJobPayload {
            book_id: "book-1".into(),
            model: "whisper-base".into(),
            stages,
        }
    }

    #[test]
    fn test_plan_orders_and_dedupes() {
        let plan = plan_stages(&[
            StageRequest {
                stage: Stage::Vectorize,
                force: false,
            },
            StageRequest {
                stage: Stage::Download,
                force: false,
            },
            StageRequest {
                stage: Stage::Download,
                force: true,
            },
        ]);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].stage, Stage::Download);
        assert!(plan[0].force);
        assert_eq!(plan[1].stage, Stage::Vectorize);
        assert!(!plan[1].force);
    }

    #[test]
    fn test_plan_empty_means_all() {
        let plan = plan_stages(&[]);
        assert_eq!(plan.len(), 4);
        assert!(plan.iter().all(|r| !r.force));
    }

    #[tokio::test]
    async fn test_completed_stages_are_skipped() {
        let (pipeline, books) = pipeline();
        books.register("book-1", "Test", 1000, &[]).unwrap();
        books.set_stage_flag("book-1", Stage::Download, true).unwrap();
        books
            .set_stage_flag("book-1", Stage::ProcessAudio, true)
            .unwrap();

        let outcome = pipeline
            .run(
                &payload(vec![
                    StageRequest {
                        stage: Stage::Download,
                        force: false,
                    },
                    StageRequest {
                        stage: Stage::ProcessAudio,
                        force: false,
                    },
                ]),
                Uuid::new_v4(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.skipped, vec![Stage::Download, Stage::ProcessAudio]);
        assert!(outcome.completed.is_empty());

        let book = books.get("book-1").unwrap().unwrap();
        assert!(book.setup);
    }

    #[tokio::test]
    async fn test_missing_model_is_config_error() {
        let (pipeline, books) = pipeline();
        books.register("book-1", "Test", 1000, &[]).unwrap();

        let err = pipeline
            .run(
                &SetupJobPayload {
                    book_id: "book-1".into(),
                    model: String::new(),
                    stages: vec![],
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LydbokError::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_book_fails() {
        let (pipeline, _books) = pipeline();
        let err = pipeline
            .run(&payload(vec![]), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, LydbokError::BookNotFound(_)));
    }

    #[tokio::test]
    async fn test_vectorize_without_transcript_fails_stage() {
        let (pipeline, books) = pipeline();
        books.register("book-1", "Test", 1000, &[]).unwrap();

        let err = pipeline
            .run(
                &payload(vec![StageRequest {
                    stage: Stage::Vectorize,
                    force: false,
                }]),
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LydbokError::Transcription(_)));

        // The failure must be visible in stage progress and the book must
        // not be marked set up.
        let tracker = &pipeline.tracker;
        let progress = tracker.get("book-1", Stage::Vectorize).unwrap().unwrap();
        assert_eq!(progress.status, StageStatus::Failed);
        assert!(!books.get("book-1").unwrap().unwrap().setup);
    }
}
