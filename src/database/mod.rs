pub mod models;

#[cfg(test)]
mod tests;

use anyhow::Result;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS lectures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                video_key TEXT,
                transcript TEXT,
                summary TEXT,
                thumbnail_key TEXT,
                video_720_key TEXT,
                video_480_key TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lecture_id INTEGER NOT NULL,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at TEXT,
                FOREIGN KEY (lecture_id) REFERENCES lectures(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status
                ON jobs(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_lecture_type
                ON jobs(lecture_id, job_type, status);

            CREATE TABLE IF NOT EXISTS transcript_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lecture_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (lecture_id) REFERENCES lectures(id) ON DELETE CASCADE,
                UNIQUE(lecture_id, chunk_index)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_lecture
                ON transcript_chunks(lecture_id, chunk_index);
        "#,
        )?;
        Ok(())
    }

    // =========================================================================
    // Job queries
    // =========================================================================

    pub fn create_job(&self, lecture_id: i64, job_type: JobType) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO jobs (lecture_id, job_type, status, created_at, updated_at)
             VALUES (?, ?, 'pending', ?, ?)",
            params![lecture_id, job_type.as_str(), now, now],
        )?;
        let id = conn.last_insert_rowid();
        let job = conn.query_row(&job_select("WHERE id = ?"), params![id], map_job_row)?;
        Ok(job)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(&job_select("WHERE id = ?"), params![id], map_job_row)
            .optional()?;
        Ok(job)
    }

    pub fn get_jobs_for_lecture(&self, lecture_id: i64) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&job_select("WHERE lecture_id = ? ORDER BY created_at ASC, id ASC"))?;
        let jobs = stmt
            .query_map(params![lecture_id], map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Batched lookup for a list of lectures in one query.
    pub fn get_jobs_for_lectures(&self, lecture_ids: &[i64]) -> Result<Vec<Job>> {
        if lecture_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; lecture_ids.len()].join(",");
        let sql = job_select(&format!(
            "WHERE lecture_id IN ({}) ORDER BY created_at ASC, id ASC",
            placeholders
        ));
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_from_iter(lecture_ids.iter()), map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn get_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&job_select("WHERE status = ? ORDER BY created_at ASC, id ASC"))?;
        let jobs = stmt
            .query_map(params![status.as_str()], map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Pending jobs in FIFO order, the worker's claim candidates.
    pub fn get_pending_jobs(&self) -> Result<Vec<Job>> {
        self.get_jobs_by_status(JobStatus::Pending)
    }

    /// Does a pending or processing job of this type exist for this lecture?
    pub fn has_active_job(&self, lecture_id: i64, job_type: JobType) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE lecture_id = ? AND job_type = ? AND status IN ('pending', 'processing')",
            params![lecture_id, job_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Transition a pending job to processing. Returns false when the row was
    /// already claimed (or is no longer pending), so two drain passes can
    /// never both win the same job.
    pub fn claim_job(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing', updated_at = datetime('now')
             WHERE id = ? AND status = 'pending'",
            params![id],
        )?;
        Ok(changed == 1)
    }

    pub fn complete_job(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = 'completed', error = NULL,
                 updated_at = datetime('now'), completed_at = datetime('now')
             WHERE id = ?",
            params![id],
        )?;
        Ok(())
    }

    pub fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?,
                 updated_at = datetime('now'), completed_at = datetime('now')
             WHERE id = ?",
            params![error, id],
        )?;
        Ok(())
    }

    /// Administrative cancel for queued-but-not-started work.
    pub fn delete_job(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM jobs WHERE id = ?", params![id])?;
        Ok(())
    }

    /// Flip orphaned "processing" rows back to pending after a crash. Only
    /// called before the worker loop starts; a live loop owns its claims.
    pub fn reset_stuck_jobs(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE jobs SET status = 'pending', updated_at = datetime('now')
             WHERE status = 'processing'",
            [],
        )?;
        if count > 0 {
            log::info!("Reset {} stuck processing jobs to pending", count);
        }
        Ok(count)
    }

    pub fn job_counts(&self) -> Result<JobCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = JobCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    // =========================================================================
    // Lecture queries
    // =========================================================================

    pub fn create_lecture(&self, title: &str, video_key: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO lectures (title, video_key) VALUES (?, ?)",
            params![title, video_key],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_lecture(&self, id: i64) -> Result<Option<Lecture>> {
        let conn = self.conn.lock().unwrap();
        let lecture = conn
            .query_row(
                &lecture_select("WHERE id = ?"),
                params![id],
                map_lecture_row,
            )
            .optional()?;
        Ok(lecture)
    }

    pub fn get_all_lectures(&self) -> Result<Vec<Lecture>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&lecture_select("ORDER BY id ASC"))?;
        let lectures = stmt
            .query_map([], map_lecture_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lectures)
    }

    pub fn lectures_with_transcript(&self) -> Result<Vec<Lecture>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&lecture_select(
            "WHERE transcript IS NOT NULL AND transcript != '' ORDER BY id ASC",
        ))?;
        let lectures = stmt
            .query_map([], map_lecture_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lectures)
    }

    pub fn set_transcript(&self, id: i64, transcript: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE lectures SET transcript = ?, updated_at = datetime('now') WHERE id = ?",
            params![transcript, id],
        )?;
        Ok(())
    }

    pub fn set_summary(&self, id: i64, summary: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE lectures SET summary = ?, updated_at = datetime('now') WHERE id = ?",
            params![summary, id],
        )?;
        Ok(())
    }

    pub fn set_thumbnail_key(&self, id: i64, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE lectures SET thumbnail_key = ?, updated_at = datetime('now') WHERE id = ?",
            params![key, id],
        )?;
        Ok(())
    }

    pub fn set_variant_keys(&self, id: i64, key_720: &str, key_480: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE lectures SET video_720_key = ?, video_480_key = ?,
                 updated_at = datetime('now')
             WHERE id = ?",
            params![key_720, key_480, id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Transcript chunk queries
    // =========================================================================

    pub fn delete_chunks(&self, lecture_id: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM transcript_chunks WHERE lecture_id = ?",
            params![lecture_id],
        )?;
        Ok(count)
    }

    /// Insert a batch of chunks in one transaction. Batches arrive
    /// incrementally from the embedding pipeline, so this is called several
    /// times per vectorization rather than once with the full set.
    pub fn insert_chunks(&self, lecture_id: i64, chunks: &[NewChunk]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_chunks
                     (lecture_id, chunk_index, chunk_text, token_count, embedding)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    lecture_id,
                    chunk.chunk_index,
                    chunk.chunk_text,
                    chunk.token_count,
                    embedding_to_blob(&chunk.embedding),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn chunks_for_lecture(&self, lecture_id: i64) -> Result<Vec<TranscriptChunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, lecture_id, chunk_index, chunk_text, token_count, embedding
             FROM transcript_chunks
             WHERE lecture_id = ?
             ORDER BY chunk_index ASC",
        )?;
        let chunks = stmt
            .query_map(params![lecture_id], map_chunk_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    pub fn chunk_count(&self, lecture_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transcript_chunks WHERE lecture_id = ?",
            params![lecture_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Every stored chunk joined with its lecture title, for search scoring.
    pub fn all_chunks_with_lectures(&self) -> Result<Vec<(TranscriptChunk, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.lecture_id, c.chunk_index, c.chunk_text, c.token_count,
                    c.embedding, l.title
             FROM transcript_chunks c
             JOIN lectures l ON c.lecture_id = l.id
             ORDER BY c.lecture_id ASC, c.chunk_index ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let chunk = map_chunk_row(row)?;
                let title: String = row.get(6)?;
                Ok((chunk, title))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// =========================================================================
// Row mapping
// =========================================================================

const JOB_COLUMNS: &str =
    "id, lecture_id, job_type, status, error, created_at, updated_at, completed_at";

fn job_select(suffix: &str) -> String {
    format!("SELECT {} FROM jobs {}", JOB_COLUMNS, suffix)
}

fn lecture_select(suffix: &str) -> String {
    format!(
        "SELECT id, title, video_key, transcript, summary, thumbnail_key,
                video_720_key, video_480_key, created_at, updated_at
         FROM lectures {}",
        suffix
    )
}

fn map_job_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let job_type: String = row.get(2)?;
    let job_type = job_type.parse::<JobType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Job {
        id: row.get(0)?,
        lecture_id: row.get(1)?,
        job_type,
        status: row.get::<_, String>(3)?.into(),
        error: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

fn map_lecture_row(row: &Row<'_>) -> rusqlite::Result<Lecture> {
    Ok(Lecture {
        id: row.get(0)?,
        title: row.get(1)?,
        video_key: row.get(2)?,
        transcript: row.get(3)?,
        summary: row.get(4)?,
        thumbnail_key: row.get(5)?,
        video_720_key: row.get(6)?,
        video_480_key: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_chunk_row(row: &Row<'_>) -> rusqlite::Result<TranscriptChunk> {
    let blob: Vec<u8> = row.get(5)?;
    Ok(TranscriptChunk {
        id: row.get(0)?,
        lecture_id: row.get(1)?,
        chunk_index: row.get(2)?,
        chunk_text: row.get(3)?,
        token_count: row.get(4)?,
        embedding: blob_to_embedding(&blob),
    })
}

/// Embeddings are stored as little-endian f32 BLOBs.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
