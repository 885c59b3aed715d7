//! Transcoding a source video into quality renditions.

use std::ffi::OsString;
use std::path::Path;

use crate::config::MediaConfig;
use crate::database::Database;
use crate::error::PipelineError;
use crate::storage::{self, derive_quality_key, ObjectStore, VideoQuality};

use super::run_tool;

/// Produce the 720p and 480p renditions for a lecture's raw video and
/// upload them under the derived quality keys.
///
/// Both renditions are encoded before anything is uploaded, so a failure
/// partway through leaves no half-recorded variant pair. Scratch files live
/// in a temp dir that is removed on every exit path.
pub async fn run(
    db: &Database,
    store: &dyn ObjectStore,
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
    let source = work_dir.path().join(source_filename(&video_key));
    storage::download_to_path(store, &video_key, &source).await?;

    let mut renditions: Vec<(String, Vec<u8>)> = Vec::new();
    for quality in VideoQuality::ALL {
        let output = work_dir.path().join(format!("{}.mp4", quality.label()));
        let args = build_transcode_args(&source, &output, quality.height());
        run_tool(&media.ffmpeg_path, &args, &format!("transcode {}", quality.label())).await?;
        let bytes = tokio::fs::read(&output).await?;
        renditions.push((derive_quality_key(&video_key, quality), bytes));
    }

    for (key, bytes) in &renditions {
        store.upload(key, bytes, "video/mp4").await?;
    }

    let key_720 = derive_quality_key(&video_key, VideoQuality::Q720);
    let key_480 = derive_quality_key(&video_key, VideoQuality::Q480);
    db.set_variant_keys(lecture_id, &key_720, &key_480)?;

    log::info!(
        "Transcoded lecture {}: {} and {}",
        lecture_id,
        key_720,
        key_480
    );
    Ok(())
}

/// H.264/AAC scaled to the target height, width following the aspect ratio.
/// `+faststart` moves the moov atom up front so playback starts immediately.
pub fn build_transcode_args(input: &Path, output: &Path, height: u32) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-vf".into(),
        format!("scale=-2:{}", height).into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        "23".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.as_os_str().to_os_string(),
    ]
}

/// Local scratch name for the downloaded source, keeping its extension.
fn source_filename(video_key: &str) -> String {
    let ext = video_key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.').map(|(_, e)| e))
        .filter(|e| !e.is_empty())
        .unwrap_or("mp4");
    format!("source.{}", ext)
}
