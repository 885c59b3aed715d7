use serde::{Deserialize, Serialize};

/// The kind of derived-artifact work a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Transcript,
    Transcode,
    Thumbnail,
    Summary,
    Vectorize,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Transcript,
        JobType::Transcode,
        JobType::Thumbnail,
        JobType::Summary,
        JobType::Vectorize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::Transcode => "transcode",
            Self::Thumbnail => "thumbnail",
            Self::Summary => "summary",
            Self::Vectorize => "vectorize",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcript" => Ok(Self::Transcript),
            "transcode" => Ok(Self::Transcode),
            "thumbnail" => Ok(Self::Thumbnail),
            "summary" => Ok(Self::Summary),
            "vectorize" => Ok(Self::Vectorize),
            other => Err(format!("unknown job type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Pending and processing jobs block admission of a new job of the
    /// same type for the same lecture.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A unit of asynchronous work tied to one lecture and one job type.
///
/// This shape is also the wire format returned to status-reporting callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub lecture_id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// The owning media entity: a lecture video with its derived assets.
///
/// The pipeline reads and writes the derived-asset fields as job side
/// effects but does not own the lecture lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
    pub id: i64,
    pub title: String,
    pub video_key: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub thumbnail_key: Option<String>,
    pub video_720_key: Option<String>,
    pub video_480_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A token-bounded transcript fragment with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub id: i64,
    pub lecture_id: i64,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
}

/// Insert shape for a chunk that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub chunk_text: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
}

/// Per-status job counts for status-reporting callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}
