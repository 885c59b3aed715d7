//! Turns lecture transcripts into embedded, searchable chunks.
//!
//! Chunking runs on the blocking pool, embeddings are generated in
//! fixed-size batches with retry/backoff against the rate-limited API, and
//! chunks are flushed to the store in bounded batches as they arrive so
//! peak memory stays independent of transcript length.

use std::sync::Arc;
use std::time::Duration;

use crate::ai::{AiError, Embedder};
use crate::config::VectorConfig;
use crate::database::{Database, NewChunk};
use crate::error::PipelineError;
use crate::vectors::chunker::{chunk_transcript, TextChunk};

/// Outcome of a bulk vectorization pass. Per-lecture failures are collected
/// here instead of aborting the batch.
#[derive(Debug, Default)]
pub struct BulkVectorizeReport {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<(i64, String)>,
}

pub struct Vectorizer {
    db: Arc<Database>,
    embedder: Arc<dyn Embedder>,
    config: VectorConfig,
}

impl Vectorizer {
    pub fn new(db: Arc<Database>, embedder: Arc<dyn Embedder>, config: VectorConfig) -> Self {
        Self {
            db,
            embedder,
            config,
        }
    }

    /// Re-vectorize one lecture: chunk its transcript, embed the chunks, and
    /// fully replace whatever was stored before. Returns the chunk count.
    pub async fn vectorize_lecture(&self, lecture_id: i64) -> Result<usize, PipelineError> {
        let lecture = self
            .db
            .get_lecture(lecture_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("lecture {}", lecture_id)))?;
        let transcript = lecture
            .transcript
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::MissingAsset(format!("lecture {} has no transcript", lecture_id))
            })?;

        let max_tokens = self.config.max_chunk_tokens;
        let chunks = tokio::task::spawn_blocking(move || chunk_transcript(&transcript, max_tokens))
            .await
            .map_err(|e| PipelineError::Io(format!("chunking task: {}", e)))?;

        log::info!(
            "Vectorizing lecture {}: {} chunks",
            lecture_id,
            chunks.len()
        );

        // Full replace: stale chunks from a previous transcript must not
        // survive re-vectorization.
        self.db.delete_chunks(lecture_id)?;
        self.embed_and_store(lecture_id, chunks).await
    }

    /// Vectorize every lecture that has a transcript; lectures without one
    /// are skipped and per-lecture failures are reported, not raised.
    pub async fn vectorize_all(&self) -> Result<BulkVectorizeReport, PipelineError> {
        let lectures = self.db.get_all_lectures()?;
        let mut report = BulkVectorizeReport::default();

        for lecture in lectures {
            let has_transcript = lecture
                .transcript
                .as_deref()
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false);
            if !has_transcript {
                report.skipped += 1;
                continue;
            }
            match self.vectorize_lecture(lecture.id).await {
                Ok(count) => {
                    log::info!("Vectorized lecture {} ({} chunks)", lecture.id, count);
                    report.processed += 1;
                }
                Err(e) => {
                    log::error!("Vectorization failed for lecture {}: {}", lecture.id, e);
                    report.failures.push((lecture.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Embed chunks batch by batch, flushing each embedded batch to the
    /// store in bounded insert transactions as soon as it is available.
    async fn embed_and_store(
        &self,
        lecture_id: i64,
        chunks: Vec<TextChunk>,
    ) -> Result<usize, PipelineError> {
        let total = chunks.len();
        let batch_size = self.config.embed_batch_size.max(1);
        let insert_size = self.config.insert_batch_size.max(1);

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_with_retry(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::Validation(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            let rows: Vec<NewChunk> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| NewChunk {
                    chunk_index: chunk.index as i64,
                    chunk_text: chunk.text.clone(),
                    token_count: chunk.token_count as i64,
                    embedding,
                })
                .collect();
            for insert_batch in rows.chunks(insert_size) {
                self.db.insert_chunks(lecture_id, insert_batch)?;
            }
        }

        Ok(total)
    }

    /// Retry transient embedding failures with exponential backoff; fatal
    /// errors propagate immediately without consuming the retry budget.
    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            match self.embedder.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    log::warn!(
                        "Embedding attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Delay before retry `attempt` (0-based): base doubled each attempt.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}
