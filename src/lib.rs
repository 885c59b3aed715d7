//! Asynchronous media-processing and semantic-search pipeline for course
//! lectures: a job queue turns an uploaded lecture video into a transcript,
//! quality renditions, a thumbnail, an AI summary, and a vector index over
//! the transcript.

pub mod ai;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod storage;
pub mod vectors;
pub mod worker;

pub use ai::{AiClient, AiError, Embedder};
pub use config::Config;
pub use database::{Database, Job, JobCounts, JobStatus, JobType, Lecture, TranscriptChunk};
pub use error::PipelineError;
pub use jobs::{JobQueue, LectureAssetUrls, MissingJobsReport};
pub use storage::{
    derive_quality_key, derive_thumbnail_key, LocalObjectStore, ObjectStore, VideoQuality,
};
pub use vectors::{BulkVectorizeReport, SearchHit, VectorSearch, Vectorizer};
pub use worker::{runner::MediaPipeline, JobRunner, JobWorker};
