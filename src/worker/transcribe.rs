//! Speech-to-text transcription of a lecture's audio track.
//!
//! The audio is extracted with ffmpeg and sent to the transcription API.
//! Tracks over the API's payload ceiling are split into fixed-length
//! segments, transcribed independently, and concatenated in order. A second
//! pass asks the chat model to insert paragraph breaks; if the reformatted
//! text changes any wording, the raw transcript is kept — formatting never
//! degrades transcription fidelity.

use std::ffi::OsString;
use std::path::Path;

use crate::ai::AiClient;
use crate::config::MediaConfig;
use crate::database::Database;
use crate::error::PipelineError;
use crate::storage::{self, ObjectStore};

use super::run_tool;

const FORMAT_SYSTEM_PROMPT: &str = "You format lecture transcripts into paragraphs. \
    Insert blank lines between paragraphs at natural topic boundaries. \
    Do not change, add, remove, or reorder any words; only insert paragraph breaks. \
    Respond with the formatted transcript and nothing else.";

pub async fn run(
    db: &Database,
    store: &dyn ObjectStore,
    ai: &AiClient,
    media: &MediaConfig,
    lecture_id: i64,
) -> Result<(), PipelineError> {
    let lecture = db
        .get_lecture(lecture_id)?
        .ok_or_else(|| PipelineError::NotFound(format!("lecture {}", lecture_id)))?;
    let video_key = lecture.video_key.ok_or_else(|| {
        PipelineError::MissingAsset(format!("lecture {} has no video", lecture_id))
    })?;

    let work_dir = tempfile::tempdir()?;
    let source = work_dir.path().join("source.mp4");
    storage::download_to_path(store, &video_key, &source).await?;

    let audio = work_dir.path().join("audio.mp3");
    let args = build_audio_extract_args(&source, &audio);
    run_tool(&media.ffmpeg_path, &args, "audio extraction").await?;

    let audio_size = tokio::fs::metadata(&audio).await?.len();
    let raw_transcript = if audio_size > media.max_audio_upload_bytes {
        log::info!(
            "Audio for lecture {} is {} bytes, splitting into {}s segments",
            lecture_id,
            audio_size,
            media.audio_segment_secs
        );
        transcribe_segmented(ai, media, work_dir.path(), &audio).await?
    } else {
        let bytes = tokio::fs::read(&audio).await?;
        ai.transcribe(bytes, "audio.mp3").await?
    };

    let transcript = format_into_paragraphs(ai, &raw_transcript).await;
    db.set_transcript(lecture_id, transcript.trim())?;

    log::info!(
        "Transcribed lecture {}: {} characters",
        lecture_id,
        transcript.len()
    );
    Ok(())
}

/// Split the audio into fixed-duration parts and transcribe each in order.
async fn transcribe_segmented(
    ai: &AiClient,
    media: &MediaConfig,
    work_dir: &Path,
    audio: &Path,
) -> Result<String, PipelineError> {
    let segment_dir = work_dir.join("segments");
    tokio::fs::create_dir_all(&segment_dir).await?;

    let args = build_segment_args(audio, &segment_dir, media.audio_segment_secs);
    run_tool(&media.ffmpeg_path, &args, "audio segmentation").await?;

    let parts = list_segments(&segment_dir).await?;
    if parts.is_empty() {
        return Err(PipelineError::Validation(
            "audio segmentation produced no parts".to_string(),
        ));
    }

    let mut texts = Vec::with_capacity(parts.len());
    for part in &parts {
        let filename = part
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "part.mp3".to_string());
        let bytes = tokio::fs::read(part).await?;
        let text = ai.transcribe(bytes, &filename).await?;
        texts.push(text.trim().to_string());
    }
    Ok(texts.join(" "))
}

/// Ask the chat model for paragraph breaks, keeping the raw transcript when
/// the call fails or the wording comes back altered.
async fn format_into_paragraphs(ai: &AiClient, raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    match ai.chat(FORMAT_SYSTEM_PROMPT, raw).await {
        Ok(formatted) if words_match(raw, &formatted) => formatted,
        Ok(_) => {
            log::warn!("Paragraph formatting altered wording, keeping raw transcript");
            raw.to_string()
        }
        Err(e) => {
            log::warn!("Paragraph formatting failed ({}), keeping raw transcript", e);
            raw.to_string()
        }
    }
}

/// Same word sequence, whitespace aside.
fn words_match(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

/// Mono 16 kHz MP3: what the transcription model wants, and small enough
/// that most lectures fit in a single upload.
pub fn build_audio_extract_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-vn".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        "16000".into(),
        "-b:a".into(),
        "64k".into(),
        output.as_os_str().to_os_string(),
    ]
}

/// Stream-copy split into numbered parts; no re-encode.
pub fn build_segment_args(input: &Path, segment_dir: &Path, segment_secs: u32) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-f".into(),
        "segment".into(),
        "-segment_time".into(),
        segment_secs.to_string().into(),
        "-c".into(),
        "copy".into(),
        segment_dir.join("part_%03d.mp3").as_os_str().to_os_string(),
    ]
}

/// Segment files in name order, which is also chronological order thanks to
/// the zero-padded numbering.
async fn list_segments(segment_dir: &Path) -> Result<Vec<std::path::PathBuf>, PipelineError> {
    let mut parts = Vec::new();
    let mut entries = tokio::fs::read_dir(segment_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("part_") && name.ends_with(".mp3") {
            parts.push(entry.path());
        }
    }
    parts.sort();
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_build_audio_extract_args() {
        let args = build_audio_extract_args(
            &PathBuf::from("/tmp/source.mp4"),
            &PathBuf::from("/tmp/audio.mp3"),
        );
        let strings: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(strings.contains(&"-vn".to_string()));
        assert!(strings.contains(&"16000".to_string()));
        assert_eq!(strings.last().unwrap(), "/tmp/audio.mp3");
    }

    #[test]
    fn test_build_segment_args() {
        let args = build_segment_args(
            &PathBuf::from("/tmp/audio.mp3"),
            &PathBuf::from("/tmp/segments"),
            600,
        );
        let strings: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert!(strings.contains(&"segment".to_string()));
        assert!(strings.contains(&"600".to_string()));
        assert!(strings.last().unwrap().ends_with("part_%03d.mp3"));
    }

    #[test]
    fn test_words_match_ignores_whitespace_only() {
        let raw = "one two three four";
        assert!(words_match(raw, "one two\n\nthree four"));
        assert!(!words_match(raw, "one two three"));
        assert!(!words_match(raw, "one two three five"));
    }

    #[tokio::test]
    async fn test_list_segments_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["part_002.mp3", "part_000.mp3", "part_001.mp3", "other.txt"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let parts = list_segments(dir.path()).await.unwrap();
        let names: Vec<String> = parts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["part_000.mp3", "part_001.mp3", "part_002.mp3"]);
    }
}
