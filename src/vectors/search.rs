//! Nearest-neighbor search over stored transcript chunks.

use serde::Serialize;
use std::sync::Arc;

use crate::ai::Embedder;
use crate::database::Database;
use crate::error::PipelineError;

/// A search result annotated with its owning lecture for display.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub lecture_id: i64,
    pub lecture_title: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub score: f32,
}

pub struct VectorSearch {
    db: Arc<Database>,
    embedder: Arc<dyn Embedder>,
}

impl VectorSearch {
    pub fn new(db: Arc<Database>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Top `limit` chunks by cosine similarity to the query. Empty and
    /// whitespace-only queries return no hits without calling the embedder.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, PipelineError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PipelineError::Validation("embedder returned no query vector".to_string())
            })?;

        let rows = self.db.all_chunks_with_lectures()?;
        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|(chunk, title)| {
                if chunk.embedding.len() != query_vector.len() {
                    log::warn!(
                        "Skipping chunk {} of lecture {}: dimension {} != query {}",
                        chunk.chunk_index,
                        chunk.lecture_id,
                        chunk.embedding.len(),
                        query_vector.len()
                    );
                    return None;
                }
                Some(SearchHit {
                    score: cosine_similarity(&query_vector, &chunk.embedding),
                    lecture_id: chunk.lecture_id,
                    lecture_title: title,
                    chunk_index: chunk.chunk_index,
                    chunk_text: chunk.chunk_text,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::database::NewChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embedder returning a fixed vector and counting invocations.
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn setup() -> (Arc<Database>, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("test.db")).unwrap();
        (Arc::new(db), temp)
    }

    fn chunk(index: i64, text: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk_index: index,
            chunk_text: text.to_string(),
            token_count: 1,
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
        // Zero vectors score zero instead of NaN
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedder() {
        let (db, _temp) = setup();
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let search = VectorSearch::new(db, embedder.clone());

        assert!(search.search("", 10).await.unwrap().is_empty());
        assert!(search.search("   \t\n", 10).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ranking_and_annotation() {
        let (db, _temp) = setup();
        let lecture_id = db.create_lecture("Signals", None).unwrap();
        db.insert_chunks(
            lecture_id,
            &[
                chunk(0, "orthogonal", vec![0.0, 1.0]),
                chunk(1, "aligned", vec![1.0, 0.0]),
                chunk(2, "opposed", vec![-1.0, 0.0]),
            ],
        )
        .unwrap();

        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let search = VectorSearch::new(db, embedder);

        let hits = search.search("alignment", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_text, "aligned");
        assert_eq!(hits[0].lecture_title, "Signals");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_skipped() {
        let (db, _temp) = setup();
        let lecture_id = db.create_lecture("L", None).unwrap();
        db.insert_chunks(
            lecture_id,
            &[
                chunk(0, "old model", vec![1.0, 0.0, 0.0]),
                chunk(1, "current model", vec![1.0, 0.0]),
            ],
        )
        .unwrap();

        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let search = VectorSearch::new(db, embedder);

        let hits = search.search("query", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_text, "current model");
    }
}
