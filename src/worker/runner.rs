//! Production job dispatch: routes each job type to its handler.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ai::{AiClient, Embedder};
use crate::config::{MediaConfig, VectorConfig};
use crate::database::{Database, JobType};
use crate::error::PipelineError;
use crate::storage::ObjectStore;
use crate::vectors::Vectorizer;

use super::{thumbnail, transcode, transcribe, JobRunner};

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize lecture transcripts for a course \
    catalog. Write a short abstractive summary, at most two paragraphs, covering the \
    topics taught and what a student will learn. Respond with the summary only.";

pub struct MediaPipeline {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    ai: Arc<AiClient>,
    media: MediaConfig,
    vectorizer: Vectorizer,
}

impl MediaPipeline {
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn ObjectStore>,
        ai: Arc<AiClient>,
        media: MediaConfig,
        vectors: VectorConfig,
    ) -> Self {
        let embedder: Arc<dyn Embedder> = ai.clone();
        let vectorizer = Vectorizer::new(db.clone(), embedder, vectors);
        Self {
            db,
            store,
            ai,
            media,
            vectorizer,
        }
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }

    async fn summarize(&self, lecture_id: i64) -> Result<(), PipelineError> {
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

        let summary = self.ai.chat(SUMMARY_SYSTEM_PROMPT, &transcript).await?;
        self.db.set_summary(lecture_id, summary.trim())?;
        log::info!("Summarized lecture {}", lecture_id);
        Ok(())
    }
}

#[async_trait]
impl JobRunner for MediaPipeline {
    async fn run(&self, job_type: JobType, lecture_id: i64) -> Result<(), PipelineError> {
        match job_type {
            JobType::Transcript => {
                transcribe::run(
                    &self.db,
                    self.store.as_ref(),
                    &self.ai,
                    &self.media,
                    lecture_id,
                )
                .await
            }
            JobType::Transcode => {
                transcode::run(&self.db, self.store.as_ref(), &self.media, lecture_id).await
            }
            JobType::Thumbnail => {
                thumbnail::run(&self.db, self.store.as_ref(), &self.media, lecture_id).await
            }
            JobType::Summary => self.summarize(lecture_id).await,
            JobType::Vectorize => self
                .vectorizer
                .vectorize_lecture(lecture_id)
                .await
                .map(|_| ()),
        }
    }
}
