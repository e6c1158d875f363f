use crate::chunking::ChunkingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Identity of the caller every operation runs as. Injected at construction
/// so tests can substitute any identity without ambient global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    /// Human-readable original filename, unique per collection.
    pub name: String,
    pub collection_id: String,
    pub owner_id: String,
    /// Collision-free object path in the blob store; never shown to users.
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewDocument {
    pub name: String,
    pub collection_id: String,
    pub owner_id: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewChunk {
    pub owner_id: String,
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchRequest {
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub collection_id: String,
    pub owner_id: String,
    pub match_count: usize,
}

/// One row returned by the server-side fused ranking procedure, already
/// ordered by descending `rrf_score`. Extra columns are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedChunk {
    pub id: String,
    pub content: String,
    pub rrf_score: f64,
}

/// One file handed to the orchestrator: the declared name and content type
/// plus the raw bytes. How these arrive (multipart form, drag-drop) is the
/// caller's concern.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStage {
    Pending,
    Uploading,
    Extracting,
    Chunking,
    Embedding,
    Persisting,
    Done,
    DuplicateRejected,
    Failed,
}

impl UploadStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStage::Done | UploadStage::DuplicateRejected | UploadStage::Failed
        )
    }

    /// Progress checkpoint published after entering this stage.
    pub fn progress(&self) -> u8 {
        match self {
            UploadStage::Pending => 0,
            UploadStage::Uploading => 10,
            UploadStage::Extracting => 30,
            UploadStage::Chunking => 50,
            UploadStage::Embedding => 60,
            UploadStage::Persisting => 80,
            UploadStage::Done | UploadStage::DuplicateRejected | UploadStage::Failed => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadStage::Pending => "pending",
            UploadStage::Uploading => "uploading to storage",
            UploadStage::Extracting => "extracting text",
            UploadStage::Chunking => "chunking",
            UploadStage::Embedding => "embedding",
            UploadStage::Persisting => "writing chunks",
            UploadStage::Done => "done",
            UploadStage::DuplicateRejected => "duplicate name",
            UploadStage::Failed => "failed",
        }
    }

    /// Legal transitions of the per-file state machine. `DuplicateRejected`
    /// is reachable from `Uploading` as well as `Pending` because the store
    /// re-verifies the name at insert time and a lost race surfaces there.
    pub fn can_advance_to(&self, next: UploadStage) -> bool {
        use UploadStage::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, DuplicateRejected)
                | (Uploading, DuplicateRejected)
                | (Uploading, Extracting)
                | (Extracting, Chunking)
                | (Chunking, Embedding)
                | (Embedding, Persisting)
                | (Persisting, Done)
                | (Pending, Failed)
                | (Uploading, Failed)
                | (Extracting, Failed)
                | (Chunking, Failed)
                | (Embedding, Failed)
                | (Persisting, Failed)
        )
    }
}

/// Observable per-file state, keyed by filename in the upload tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileTaskState {
    pub stage: UploadStage,
    pub progress: u8,
    pub error: Option<String>,
}

impl FileTaskState {
    pub fn pending() -> Self {
        Self {
            stage: UploadStage::Pending,
            progress: UploadStage::Pending.progress(),
            error: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.stage.label()
    }
}

/// Outcome of one upload batch. `succeeded` counts files that reached
/// `Done`; duplicates and failures do not count.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub states: HashMap<String, FileTaskState>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunking: ChunkingConfig,
    /// How long terminal per-file states stay readable after a batch
    /// resolves before the tracker is cleared.
    pub clear_grace: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            clear_grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages_are_terminal() {
        assert!(UploadStage::Done.is_terminal());
        assert!(UploadStage::DuplicateRejected.is_terminal());
        assert!(UploadStage::Failed.is_terminal());
        assert!(!UploadStage::Embedding.is_terminal());
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        use UploadStage::*;
        let path = [Pending, Uploading, Extracting, Chunking, Embedding, Persisting, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use UploadStage::*;
        assert!(!Embedding.can_advance_to(DuplicateRejected));
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Uploading));
        assert!(!Pending.can_advance_to(Extracting));
        assert!(!Persisting.can_advance_to(Uploading));
    }

    #[test]
    fn terminal_stages_publish_full_progress() {
        assert_eq!(UploadStage::Done.progress(), 100);
        assert_eq!(UploadStage::DuplicateRejected.progress(), 100);
        assert_eq!(UploadStage::Failed.progress(), 100);
        assert_eq!(UploadStage::Pending.progress(), 0);
    }

    #[test]
    fn anonymous_context_is_detected() {
        assert!(AuthContext::new("").is_anonymous());
        assert!(AuthContext::new("  ").is_anonymous());
        assert!(!AuthContext::new("user-1").is_anonymous());
    }
}
