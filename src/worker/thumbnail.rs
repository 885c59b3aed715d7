//! Thumbnail extraction: one scaled frame re-encoded for display.

use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;
use std::ffi::OsString;
use std::path::Path;

use crate::config::MediaConfig;
use crate::database::Database;
use crate::error::PipelineError;
use crate::storage::{self, derive_thumbnail_key, ObjectStore};

use super::run_tool;

const JPEG_QUALITY: u8 = 85;

/// Grab a frame a few seconds in (the opening moments are usually a black
/// slate), scale it, re-encode as JPEG, and store it under the derived
/// thumbnail key.
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
    let source = work_dir.path().join("source.mp4");
    storage::download_to_path(store, &video_key, &source).await?;

    let frame = work_dir.path().join("frame.png");
    let args = build_frame_args(
        &source,
        &frame,
        media.thumbnail_offset_secs,
        media.thumbnail_width,
    );
    run_tool(&media.ffmpeg_path, &args, "thumbnail frame grab").await?;

    let jpeg = encode_display_jpeg(&frame)?;
    let key = derive_thumbnail_key(&video_key);
    store.upload(&key, &jpeg, "image/jpeg").await?;
    db.set_thumbnail_key(lecture_id, &key)?;

    log::info!("Thumbnail stored for lecture {}: {}", lecture_id, key);
    Ok(())
}

/// Seek before decode (`-ss` ahead of `-i`), take a single frame, scale to
/// the target width with the height following the aspect ratio.
pub fn build_frame_args(input: &Path, output: &Path, offset_secs: u32, width: u32) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-ss".into(),
        offset_secs.to_string().into(),
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-frames:v".into(),
        "1".into(),
        "-vf".into(),
        format!("scale={}:-2", width).into(),
        output.as_os_str().to_os_string(),
    ]
}

/// Re-encode the grabbed frame as a display JPEG.
fn encode_display_jpeg(frame_path: &Path) -> Result<Vec<u8>, PipelineError> {
    let frame = image::open(frame_path)?.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.write_image(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_build_frame_args() {
        let args = build_frame_args(
            &PathBuf::from("/tmp/source.mp4"),
            &PathBuf::from("/tmp/frame.png"),
            3,
            640,
        );
        let strings: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(strings.contains(&"scale=640:-2".to_string()));
        assert_eq!(strings[1], "-ss");
        assert_eq!(strings[2], "3");
        // Seek flag must precede the input for fast seeking
        let input_pos = strings.iter().position(|s| s == "-i").unwrap();
        assert!(strings.iter().position(|s| s == "-ss").unwrap() < input_pos);
    }

    #[test]
    fn test_encode_display_jpeg_roundtrip() {
        let dir = TempDir::new().unwrap();
        let png_path = dir.path().join("frame.png");
        let frame = image::RgbImage::from_fn(8, 6, |x, y| {
            image::Rgb([(x * 30) as u8, (y * 40) as u8, 128])
        });
        frame.save(&png_path).unwrap();

        let jpeg = encode_display_jpeg(&png_path).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 6);
    }
}
