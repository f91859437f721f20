//! Individual setup stage implementations.

use super::SetupPipeline;
use crate::cache::TranscriptionRequest;
use crate::chunking::{chunk_transcript, ChunkOptions};
use crate::error::{LydbokError, Result};
use crate::library::{Book, Stage};
use crate::transcription::{segments_from_output, WhisperOutput};
use crate::worker::progress::{parse_last_timestamp, progress_percent};
use crate::worker::WorkerCommand;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Name of the single normalized audio file produced by audio processing.
const PROCESSED_AUDIO_FILE: &str = "processed.wav";

impl SetupPipeline {
    /// Download every source file of the book. Files already on disk are
    /// kept; progress advances per file.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub(super) async fn run_download(&self, book: &Book) -> Result<()> {
        if book.files.is_empty() {
            return Err(LydbokError::InvalidInput(format!(
                "Book {} has no files to download",
                book.id
            )));
        }

        let dir = self.settings.downloads_dir(&book.id);
        std::fs::create_dir_all(&dir)?;

        let total = book.files.len();
        for (i, file) in book.files.iter().enumerate() {
            let dest = dir.join(&file.path);
            if dest.exists() {
                debug!("File {} already downloaded", file.path);
            } else {
                info!("Downloading {} from {}", file.path, file.download_url);
                let response = self
                    .http
                    .get(&file.download_url)
                    .send()
                    .await?
                    .error_for_status()?;
                let bytes = response.bytes().await?;

                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&dest, &bytes)?;
            }

            let pct = (i + 1) as f64 / total as f64 * 100.0;
            self.tracker.update(&book.id, Stage::Download, pct)?;
        }

        Ok(())
    }

    /// Normalize the downloaded files into a single WAV via the external
    /// audio worker.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub(super) async fn run_process_audio(&self, book: &Book, job_id: Uuid) -> Result<()> {
        let downloads = self.settings.downloads_dir(&book.id);
        let audio_dir = self.settings.audio_dir(&book.id);
        std::fs::create_dir_all(&audio_dir)?;
        let output = audio_dir.join(PROCESSED_AUDIO_FILE);

        let script = self
            .settings
            .worker_script(&self.settings.workers.process_audio_script);
        let command = WorkerCommand {
            program: self.settings.workers.runtime.clone(),
            args: vec![
                script.to_string_lossy().into_owned(),
                downloads.to_string_lossy().into_owned(),
                output.to_string_lossy().into_owned(),
            ],
            label: "process-audio".to_string(),
        };

        self.spawner.spawn(command, Some(job_id), |_| {}).await?;
        Ok(())
    }

    /// Transcribe the processed audio, parsing worker output for progress.
    /// Results are cached so a re-run with the same model is free.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub(super) async fn run_transcribe(
        &self,
        book: &Book,
        model: &str,
        job_id: Uuid,
    ) -> Result<()> {
        let audio = self.settings.audio_dir(&book.id).join(PROCESSED_AUDIO_FILE);
        if !audio.exists() {
            return Err(LydbokError::Transcription(format!(
                "Processed audio not found at {}; run the process_audio stage first",
                audio.display()
            )));
        }

        let request = TranscriptionRequest {
            provider_type: "whisper".to_string(),
            provider_model: model.to_string(),
            audio_url: audio.to_string_lossy().into_owned(),
            start_time: None,
            duration: (book.duration_ms > 0).then_some(book.duration_ms),
            offset: None,
        };

        let raw = match self.cache.get(&request) {
            Some(raw) => {
                info!("Using cached transcription for {}", book.id);
                raw
            }
            None => {
                self.transcribe_with_worker(book, model, &audio, job_id)
                    .await?
            }
        };

        let output: WhisperOutput = serde_json::from_value(raw.clone())
            .map_err(|e| LydbokError::Transcription(format!("Invalid transcription output: {}", e)))?;
        let segments = segments_from_output(&output, &book.id, PROCESSED_AUDIO_FILE, model, 0);
        if segments.is_empty() {
            return Err(LydbokError::Transcription(format!(
                "Transcription produced no segments for {}",
                book.id
            )));
        }

        self.segments.replace_segments(&book.id, &segments)?;
        self.cache.store(&request, &raw);
        Ok(())
    }

    async fn transcribe_with_worker(
        &self,
        book: &Book,
        model: &str,
        audio: &std::path::Path,
        job_id: Uuid,
    ) -> Result<serde_json::Value> {
        let output_path = audio.with_extension("wav.json");

        let script = self
            .settings
            .worker_script(&self.settings.workers.transcribe_script);
        let command = WorkerCommand {
            program: self.settings.workers.runtime.clone(),
            args: vec![
                script.to_string_lossy().into_owned(),
                "--file".to_string(),
                audio.to_string_lossy().into_owned(),
                "--model".to_string(),
                model.to_string(),
            ],
            label: "transcribe".to_string(),
        };

        let tracker = self.tracker.clone();
        let book_id = book.id.clone();
        let duration_ms = book.duration_ms;
        self.spawner
            .spawn(command, Some(job_id), move |line| {
                if let Some(processed_ms) = parse_last_timestamp(line) {
                    if let Some(pct) = progress_percent(processed_ms, duration_ms) {
                        if let Err(e) = tracker.update(&book_id, Stage::Transcribe, pct) {
                            warn!("Failed to record transcription progress: {}", e);
                        }
                    }
                }
            })
            .await?;

        let content = std::fs::read_to_string(&output_path).map_err(|e| {
            LydbokError::Transcription(format!(
                "Failed to read transcription output {}: {}",
                output_path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Chunk the stored transcript and rebuild the book's vector
    /// collection from scratch.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub(super) async fn run_vectorize(&self, book: &Book) -> Result<()> {
        let segments = self.segments.get_segments(&book.id)?;
        if segments.is_empty() {
            return Err(LydbokError::Transcription(format!(
                "No transcript segments for {}; run the transcribe stage first",
                book.id
            )));
        }

        let options = ChunkOptions {
            max_chunk_seconds: self.settings.chunking.max_chunk_seconds,
        };
        let chunks = chunk_transcript(&segments, &options);
        info!("Chunked {} segments into {} chunks", segments.len(), chunks.len());
        self.tracker.update(&book.id, Stage::Vectorize, 50.0)?;

        self.index.rebuild(&book.id, &chunks).await
    }
}
