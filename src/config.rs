//! Pipeline configuration loaded from `lecture-pipeline.yaml`.
//!
//! Every field has a serde default so a missing or partial file still yields
//! a runnable configuration. The AI API key can always be overridden through
//! the `LECTURE_PIPELINE_API_KEY` environment variable so it never has to
//! live in the YAML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "LECTURE_PIPELINE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub vectors: VectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory backing the local object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base URL prepended to object keys when presigning.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between drain passes when the queue is empty.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Frame-grab offset; skips the black lead-in at the start of recordings.
    #[serde(default = "default_thumbnail_offset_secs")]
    pub thumbnail_offset_secs: u32,
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    /// Audio segment length used when a track exceeds the upload ceiling.
    #[serde(default = "default_audio_segment_secs")]
    pub audio_segment_secs: u32,
    /// Transcription API payload ceiling in bytes.
    #[serde(default = "default_max_audio_upload_bytes")]
    pub max_audio_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Token budget per transcript chunk.
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,
    /// Texts per embedding API call.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    /// Chunks per database insert transaction.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    /// Attempts per embedding batch before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay; doubles on every subsequent attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Results returned by a search query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lecture-pipeline")
}

fn default_storage_root() -> PathBuf {
    data_dir().join("objects")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/media".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_thumbnail_offset_secs() -> u32 {
    3
}

fn default_thumbnail_width() -> u32 {
    640
}

fn default_audio_segment_secs() -> u32 {
    600
}

fn default_max_audio_upload_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_max_chunk_tokens() -> usize {
    500
}

fn default_embed_batch_size() -> usize {
    100
}

fn default_insert_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_search_limit() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key: String::new(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            transcription_model: default_transcription_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            thumbnail_offset_secs: default_thumbnail_offset_secs(),
            thumbnail_width: default_thumbnail_width(),
            audio_segment_secs: default_audio_segment_secs(),
            max_audio_upload_bytes: default_max_audio_upload_bytes(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: default_max_chunk_tokens(),
            embed_batch_size: default_embed_batch_size(),
            insert_batch_size: default_insert_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            search_limit: default_search_limit(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, falling back to defaults when the
    /// file is absent. The API key env var always wins over the file value.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&content)?
            }
            Some(p) => {
                log::warn!("Config file {:?} not found, using defaults", p);
                Config::default()
            }
            None => Config::default(),
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.ai.api_key = key.trim().to_string();
            }
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("lecture_pipeline.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.vectors.embed_batch_size, 100);
        assert_eq!(config.vectors.max_attempts, 3);
        assert_eq!(config.media.audio_segment_secs, 600);
        assert_eq!(config.worker.poll_interval_secs, 5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "vectors:\n  embed_batch_size: 16\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.vectors.embed_batch_size, 16);
        assert_eq!(config.vectors.insert_batch_size, 50);
        assert_eq!(config.ai.transcription_model, "whisper-1");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "worker:\n  poll_interval_secs: 1\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.worker.poll_interval_secs, 1);
    }
}
