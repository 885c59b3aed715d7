// Store-level tests for the job, lecture, and transcript-chunk tables.
// Run with: cargo test --lib database::tests

#[cfg(test)]
mod job_store_tests {
    use crate::database::{Database, JobStatus, JobType, NewChunk};
    use tempfile::TempDir;

    fn setup_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path).unwrap();
        (db, temp_dir)
    }

    fn setup_db_with_lecture() -> (Database, TempDir, i64) {
        let (db, temp) = setup_test_db();
        let lecture_id = db
            .create_lecture("Intro to Databases", Some("videos/intro.mp4"))
            .unwrap();
        (db, temp, lecture_id)
    }

    // =========================================================================
    // Job lifecycle
    // =========================================================================

    #[test]
    fn test_create_job_starts_pending() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Transcript).unwrap();

        assert!(job.id > 0);
        assert_eq!(job.lecture_id, lecture_id);
        assert_eq!(job.job_type, JobType::Transcript);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_claim_job_wins_once() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Transcode).unwrap();

        assert!(db.claim_job(job.id).unwrap());
        // Second claim must lose: the row is no longer pending
        assert!(!db.claim_job(job.id).unwrap());

        let job = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_complete_job_sets_terminal_fields() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Summary).unwrap();
        db.claim_job(job.id).unwrap();
        db.complete_job(job.id).unwrap();

        let job = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_job_records_error() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Thumbnail).unwrap();
        db.claim_job(job.id).unwrap();
        db.fail_job(job.id, "thumbnail extraction failed (exit 1)")
            .unwrap();

        let job = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("thumbnail extraction failed (exit 1)")
        );
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_has_active_job_tracks_lifecycle() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        assert!(!db.has_active_job(lecture_id, JobType::Transcript).unwrap());

        let job = db.create_job(lecture_id, JobType::Transcript).unwrap();
        assert!(db.has_active_job(lecture_id, JobType::Transcript).unwrap());
        // A different type is unaffected
        assert!(!db.has_active_job(lecture_id, JobType::Summary).unwrap());

        db.claim_job(job.id).unwrap();
        assert!(db.has_active_job(lecture_id, JobType::Transcript).unwrap());

        db.complete_job(job.id).unwrap();
        assert!(!db.has_active_job(lecture_id, JobType::Transcript).unwrap());
    }

    #[test]
    fn test_failed_job_is_not_active() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Vectorize).unwrap();
        db.claim_job(job.id).unwrap();
        db.fail_job(job.id, "boom").unwrap();

        assert!(!db.has_active_job(lecture_id, JobType::Vectorize).unwrap());
    }

    #[test]
    fn test_pending_jobs_fifo_order() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let first = db.create_job(lecture_id, JobType::Transcript).unwrap();
        let second = db.create_job(lecture_id, JobType::Transcode).unwrap();
        let third = db.create_job(lecture_id, JobType::Thumbnail).unwrap();

        let pending = db.get_pending_jobs().unwrap();
        let ids: Vec<i64> = pending.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_reset_stuck_jobs() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Transcript).unwrap();
        db.claim_job(job.id).unwrap();

        let reset = db.reset_stuck_jobs().unwrap();
        assert_eq!(reset, 1);

        let job = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_delete_job() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let job = db.create_job(lecture_id, JobType::Transcript).unwrap();
        db.delete_job(job.id).unwrap();
        assert!(db.get_job(job.id).unwrap().is_none());
    }

    #[test]
    fn test_job_counts() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        let a = db.create_job(lecture_id, JobType::Transcript).unwrap();
        let b = db.create_job(lecture_id, JobType::Transcode).unwrap();
        db.create_job(lecture_id, JobType::Thumbnail).unwrap();

        db.claim_job(a.id).unwrap();
        db.complete_job(a.id).unwrap();
        db.claim_job(b.id).unwrap();
        db.fail_job(b.id, "err").unwrap();

        let counts = db.job_counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn test_get_jobs_for_lectures_batched() {
        let (db, _temp) = setup_test_db();
        let a = db.create_lecture("A", None).unwrap();
        let b = db.create_lecture("B", None).unwrap();
        let c = db.create_lecture("C", None).unwrap();
        db.create_job(a, JobType::Transcript).unwrap();
        db.create_job(b, JobType::Transcript).unwrap();
        db.create_job(c, JobType::Transcript).unwrap();

        let jobs = db.get_jobs_for_lectures(&[a, c]).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.lecture_id == a || j.lecture_id == c));

        assert!(db.get_jobs_for_lectures(&[]).unwrap().is_empty());
    }

    // =========================================================================
    // Lectures
    // =========================================================================

    #[test]
    fn test_lecture_asset_updates() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();

        db.set_transcript(lecture_id, "hello world").unwrap();
        db.set_summary(lecture_id, "a greeting").unwrap();
        db.set_thumbnail_key(lecture_id, "videos/intro_thumb.jpg")
            .unwrap();
        db.set_variant_keys(lecture_id, "videos/intro_720p.mp4", "videos/intro_480p.mp4")
            .unwrap();

        let lecture = db.get_lecture(lecture_id).unwrap().unwrap();
        assert_eq!(lecture.transcript.as_deref(), Some("hello world"));
        assert_eq!(lecture.summary.as_deref(), Some("a greeting"));
        assert_eq!(
            lecture.thumbnail_key.as_deref(),
            Some("videos/intro_thumb.jpg")
        );
        assert_eq!(
            lecture.video_720_key.as_deref(),
            Some("videos/intro_720p.mp4")
        );
        assert_eq!(
            lecture.video_480_key.as_deref(),
            Some("videos/intro_480p.mp4")
        );
    }

    #[test]
    fn test_lectures_with_transcript_filters_empty() {
        let (db, _temp) = setup_test_db();
        let with = db.create_lecture("With", None).unwrap();
        let without = db.create_lecture("Without", None).unwrap();
        let empty = db.create_lecture("Empty", None).unwrap();

        db.set_transcript(with, "some text").unwrap();
        db.set_transcript(empty, "").unwrap();

        let lectures = db.lectures_with_transcript().unwrap();
        assert_eq!(lectures.len(), 1);
        assert_eq!(lectures[0].id, with);
        assert_ne!(lectures[0].id, without);
    }

    // =========================================================================
    // Transcript chunks
    // =========================================================================

    fn sample_chunks(n: usize) -> Vec<NewChunk> {
        (0..n)
            .map(|i| NewChunk {
                chunk_index: i as i64,
                chunk_text: format!("chunk {} ", i),
                token_count: 3,
                embedding: vec![i as f32, 0.5, -1.25],
            })
            .collect()
    }

    #[test]
    fn test_chunk_roundtrip_preserves_embedding() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        db.insert_chunks(lecture_id, &sample_chunks(2)).unwrap();

        let chunks = db.chunks_for_lecture(lecture_id).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].embedding, vec![0.0, 0.5, -1.25]);
        assert_eq!(chunks[1].embedding, vec![1.0, 0.5, -1.25]);
        assert_eq!(chunks[1].token_count, 3);
    }

    #[test]
    fn test_chunks_ordered_by_index() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        // Insert out of order; the read side must sort by chunk_index
        let mut chunks = sample_chunks(3);
        chunks.reverse();
        db.insert_chunks(lecture_id, &chunks).unwrap();

        let stored = db.chunks_for_lecture(lecture_id).unwrap();
        let indexes: Vec<i64> = stored.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_then_insert_replaces_chunks() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        db.insert_chunks(lecture_id, &sample_chunks(5)).unwrap();
        assert_eq!(db.chunk_count(lecture_id).unwrap(), 5);

        let deleted = db.delete_chunks(lecture_id).unwrap();
        assert_eq!(deleted, 5);
        db.insert_chunks(lecture_id, &sample_chunks(2)).unwrap();
        assert_eq!(db.chunk_count(lecture_id).unwrap(), 2);
    }

    #[test]
    fn test_all_chunks_with_lectures_carries_title() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        db.insert_chunks(lecture_id, &sample_chunks(1)).unwrap();

        let rows = db.all_chunks_with_lectures().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.lecture_id, lecture_id);
        assert_eq!(rows[0].1, "Intro to Databases");
    }

    #[test]
    fn test_duplicate_chunk_index_rejected() {
        let (db, _temp, lecture_id) = setup_db_with_lecture();
        db.insert_chunks(lecture_id, &sample_chunks(1)).unwrap();
        let result = db.insert_chunks(lecture_id, &sample_chunks(1));
        assert!(result.is_err());
    }
}
