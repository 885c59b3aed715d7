pub mod chunker;
pub mod pipeline;
pub mod search;

pub use chunker::{chunk_transcript, estimate_tokens, TextChunk};
pub use pipeline::{BulkVectorizeReport, Vectorizer};
pub use search::{SearchHit, VectorSearch};
