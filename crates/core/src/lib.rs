pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod search;
pub mod stores;
pub mod traits;

pub use chunking::{
    chunk_text, normalize_whitespace, ChunkingConfig, TextChunk, DEFAULT_CHUNK_OVERLAP_CHARS,
    DEFAULT_MAX_CHUNK_CHARS,
};
pub use embeddings::{Embedder, EmbeddingConfig, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError, StoreError};
pub use extractor::extract_text;
pub use models::{
    AuthContext, BatchReport, Collection, Document, FileTaskState, HybridSearchRequest,
    IngestionOptions, NewChunk, NewDocument, RankedChunk, UploadFile, UploadStage,
};
pub use orchestrator::{CompletionHook, IngestOrchestrator, UploadTracker};
pub use search::{HybridSearchEngine, SearchOutcome, DEFAULT_MATCH_COUNT};
pub use stores::{BucketConfig, BucketStore, PostgrestConfig, PostgrestStore};
pub use traits::{BlobStore, DocumentStore};
