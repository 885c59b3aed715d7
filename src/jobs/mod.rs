//! Job admission: turns "I want work type X done for lecture Y" into zero
//! or one new job while keeping the at-most-one-active invariant.
//!
//! The active-job check is advisory, not a lock. Two near-simultaneous
//! calls can both pass it before either inserts; the system accepts that
//! window because every handler is idempotent (re-running transcription
//! overwrites the same transcript). Callers needing a hard guarantee would
//! claim with a conditional insert behind a unique active-status index.

use serde::Serialize;
use std::sync::Arc;

use crate::database::{Database, Job, JobType, Lecture};
use crate::error::PipelineError;
use crate::storage::{derive_quality_key, derive_thumbnail_key, ObjectStore, VideoQuality};

/// Outcome of the bulk missing-work scan.
#[derive(Debug, Default)]
pub struct MissingJobsReport {
    pub queued: Vec<Job>,
    /// Lectures whose declared raw video no longer exists in storage.
    pub skipped_missing_video: Vec<i64>,
}

/// Presigned URLs for a lecture's assets, the shape a status or playback
/// caller serves onward.
#[derive(Debug, Clone, Serialize)]
pub struct LectureAssetUrls {
    pub video: Option<String>,
    pub video_720: Option<String>,
    pub video_480: Option<String>,
    pub thumbnail: Option<String>,
}

pub struct JobQueue {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
}

impl JobQueue {
    pub fn new(db: Arc<Database>, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    /// Queue one job. Returns `None` when an active job of this type already
    /// exists for the lecture — an idempotent no-op, not an error, since
    /// callers retry freely (e.g. a UI button).
    pub async fn queue_job(
        &self,
        lecture_id: i64,
        job_type: JobType,
    ) -> Result<Option<Job>, PipelineError> {
        let lecture = self.get_lecture(lecture_id)?;
        self.check_prerequisite(&lecture, job_type).await?;

        if self.db.has_active_job(lecture_id, job_type)? {
            log::info!(
                "Job {} for lecture {} already active, not queued",
                job_type,
                lecture_id
            );
            return Ok(None);
        }

        let job = self.db.create_job(lecture_id, job_type)?;
        log::info!("Queued {} job {} for lecture {}", job_type, job.id, lecture_id);
        Ok(Some(job))
    }

    /// Queue every job type the lecture is missing. Requires the raw video
    /// to actually exist in storage — the key alone may be stale.
    pub async fn queue_all_job_types(&self, lecture_id: i64) -> Result<Vec<Job>, PipelineError> {
        let lecture = self.get_lecture(lecture_id)?;
        let video_key = lecture.video_key.clone().ok_or_else(|| {
            PipelineError::MissingAsset(format!("lecture {} has no video", lecture_id))
        })?;
        if !self.store.exists(&video_key).await? {
            return Err(PipelineError::MissingAsset(format!(
                "video {} for lecture {} does not exist in storage",
                video_key, lecture_id
            )));
        }

        let mut created = Vec::new();
        for job_type in JobType::ALL {
            if self.needs_job(&lecture, &video_key, job_type).await? {
                if let Some(job) = self.queue_if_inactive(lecture_id, job_type)? {
                    created.push(job);
                }
            }
        }
        Ok(created)
    }

    /// Scan every lecture and queue whatever derived work is missing.
    /// Lectures whose raw video vanished from storage are skipped with a
    /// warning instead of queueing jobs that can only fail.
    pub async fn queue_missing_for_all_lectures(&self) -> Result<MissingJobsReport, PipelineError> {
        let lectures = self.db.get_all_lectures()?;
        let mut report = MissingJobsReport::default();

        for lecture in lectures {
            let video_key = match &lecture.video_key {
                Some(key) => {
                    if self.store.exists(key).await? {
                        Some(key.clone())
                    } else {
                        log::warn!(
                            "Skipping lecture {}: video {} no longer exists in storage",
                            lecture.id,
                            key
                        );
                        report.skipped_missing_video.push(lecture.id);
                        continue;
                    }
                }
                None => None,
            };

            let has_transcript = has_text(lecture.transcript.as_deref());

            if let Some(video_key) = &video_key {
                if !has_transcript {
                    self.queue_into(&mut report.queued, lecture.id, JobType::Transcript)?;
                }
                for quality in VideoQuality::ALL {
                    if !self.store.exists(&derive_quality_key(video_key, quality)).await? {
                        self.queue_into(&mut report.queued, lecture.id, JobType::Transcode)?;
                        break;
                    }
                }
                if !self.store.exists(&derive_thumbnail_key(video_key)).await? {
                    self.queue_into(&mut report.queued, lecture.id, JobType::Thumbnail)?;
                }
            }

            if has_transcript {
                if !has_text(lecture.summary.as_deref()) {
                    self.queue_into(&mut report.queued, lecture.id, JobType::Summary)?;
                }
                if self.db.chunk_count(lecture.id)? == 0 {
                    self.queue_into(&mut report.queued, lecture.id, JobType::Vectorize)?;
                }
            }
        }

        log::info!(
            "Missing-work scan queued {} jobs, skipped {} lectures",
            report.queued.len(),
            report.skipped_missing_video.len()
        );
        Ok(report)
    }

    /// Presigned URLs for the lecture's stored assets.
    pub async fn lecture_asset_urls(
        &self,
        lecture_id: i64,
    ) -> Result<LectureAssetUrls, PipelineError> {
        let lecture = self.get_lecture(lecture_id)?;
        Ok(LectureAssetUrls {
            video: self.presign(lecture.video_key.as_deref()).await?,
            video_720: self.presign(lecture.video_720_key.as_deref()).await?,
            video_480: self.presign(lecture.video_480_key.as_deref()).await?,
            thumbnail: self.presign(lecture.thumbnail_key.as_deref()).await?,
        })
    }

    async fn presign(&self, key: Option<&str>) -> Result<Option<String>, PipelineError> {
        match key {
            Some(k) => Ok(Some(self.store.get_presigned_url(k).await?)),
            None => Ok(None),
        }
    }

    fn get_lecture(&self, lecture_id: i64) -> Result<Lecture, PipelineError> {
        self.db
            .get_lecture(lecture_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("lecture {}", lecture_id)))
    }

    /// Synchronous prerequisite check: a job that cannot possibly succeed is
    /// rejected at admission rather than queued to fail.
    async fn check_prerequisite(
        &self,
        lecture: &Lecture,
        job_type: JobType,
    ) -> Result<(), PipelineError> {
        match job_type {
            JobType::Transcript | JobType::Transcode | JobType::Thumbnail => {
                let key = lecture.video_key.as_deref().ok_or_else(|| {
                    PipelineError::MissingAsset(format!("lecture {} has no video", lecture.id))
                })?;
                if !self.store.exists(key).await? {
                    return Err(PipelineError::MissingAsset(format!(
                        "video {} for lecture {} does not exist in storage",
                        key, lecture.id
                    )));
                }
            }
            JobType::Summary | JobType::Vectorize => {
                if !has_text(lecture.transcript.as_deref()) {
                    return Err(PipelineError::MissingAsset(format!(
                        "lecture {} has no transcript",
                        lecture.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Is this job type's artifact missing for the lecture?
    async fn needs_job(
        &self,
        lecture: &Lecture,
        video_key: &str,
        job_type: JobType,
    ) -> Result<bool, PipelineError> {
        let has_transcript = has_text(lecture.transcript.as_deref());
        let needed = match job_type {
            JobType::Transcript => !has_transcript,
            JobType::Transcode => {
                let mut missing = false;
                for quality in VideoQuality::ALL {
                    if !self.store.exists(&derive_quality_key(video_key, quality)).await? {
                        missing = true;
                        break;
                    }
                }
                missing
            }
            JobType::Thumbnail => !self.store.exists(&derive_thumbnail_key(video_key)).await?,
            JobType::Summary => has_transcript && !has_text(lecture.summary.as_deref()),
            JobType::Vectorize => has_transcript && self.db.chunk_count(lecture.id)? == 0,
        };
        Ok(needed)
    }

    fn queue_if_inactive(
        &self,
        lecture_id: i64,
        job_type: JobType,
    ) -> Result<Option<Job>, PipelineError> {
        if self.db.has_active_job(lecture_id, job_type)? {
            return Ok(None);
        }
        Ok(Some(self.db.create_job(lecture_id, job_type)?))
    }

    fn queue_into(
        &self,
        queued: &mut Vec<Job>,
        lecture_id: i64,
        job_type: JobType,
    ) -> Result<(), PipelineError> {
        if let Some(job) = self.queue_if_inactive(lecture_id, job_type)? {
            queued.push(job);
        }
        Ok(())
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}
