use crate::chunking::chunk_text;
use crate::embeddings::Embedder;
use crate::error::{IngestError, StoreError};
use crate::extractor::extract_text;
use crate::models::{
    AuthContext, BatchReport, Collection, Document, FileTaskState, IngestionOptions, NewChunk,
    NewDocument, UploadFile, UploadStage,
};
use crate::traits::{BlobStore, DocumentStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type CompletionHook = Arc<dyn Fn(&BatchReport) + Send + Sync>;

/// Observable per-batch upload state, keyed by filename. Updates are
/// race-free per file; snapshots are cheap clones for UI polling. The map
/// is cleared a grace period after the batch resolves.
#[derive(Clone, Default)]
pub struct UploadTracker {
    inner: Arc<Mutex<HashMap<String, FileTaskState>>>,
}

impl UploadTracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FileTaskState>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, filename: &str) {
        self.lock()
            .insert(filename.to_string(), FileTaskState::pending());
    }

    fn advance(&self, filename: &str, next: UploadStage) -> Result<(), IngestError> {
        let mut states = self.lock();
        let state = states
            .entry(filename.to_string())
            .or_insert_with(FileTaskState::pending);

        if !state.stage.can_advance_to(next) {
            return Err(IngestError::IllegalTransition {
                from: state.stage,
                to: next,
            });
        }

        state.stage = next;
        state.progress = next.progress();
        Ok(())
    }

    fn reject_duplicate(&self, filename: &str, message: &str) {
        self.terminate(filename, UploadStage::DuplicateRejected, message);
    }

    fn fail(&self, filename: &str, message: &str) {
        self.terminate(filename, UploadStage::Failed, message);
    }

    fn terminate(&self, filename: &str, stage: UploadStage, message: &str) {
        let mut states = self.lock();
        let state = states
            .entry(filename.to_string())
            .or_insert_with(FileTaskState::pending);

        if !state.stage.can_advance_to(stage) {
            warn!(
                file = %filename,
                from = ?state.stage,
                to = ?stage,
                "refusing illegal terminal transition"
            );
            return;
        }

        state.stage = stage;
        state.progress = stage.progress();
        state.error = Some(message.to_string());
    }

    pub fn snapshot(&self) -> HashMap<String, FileTaskState> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Per-file pipeline coordinator: duplicate check, blob upload, metadata
/// insert, extract, chunk, embed, bulk chunk insert, with per-file state
/// published after every stage. Collaborators are injected so tests can
/// substitute fakes for every network seam.
pub struct IngestOrchestrator<S, B, E> {
    store: S,
    blobs: B,
    embedder: E,
    auth: AuthContext,
    options: IngestionOptions,
    tracker: UploadTracker,
    completion_hook: Option<CompletionHook>,
}

impl<S, B, E> IngestOrchestrator<S, B, E>
where
    S: DocumentStore,
    B: BlobStore,
    E: Embedder,
{
    pub fn new(store: S, blobs: B, embedder: E, auth: AuthContext) -> Self {
        Self {
            store,
            blobs,
            embedder,
            auth,
            options: IngestionOptions::default(),
            tracker: UploadTracker::default(),
            completion_hook: None,
        }
    }

    pub fn with_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a callback fired once per batch when at least one file
    /// reached `Done`, so the caller can refresh its document listing.
    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.completion_hook = Some(hook);
        self
    }

    pub fn tracker(&self) -> UploadTracker {
        self.tracker.clone()
    }

    fn ensure_authenticated(&self) -> Result<(), IngestError> {
        if self.auth.is_anonymous() {
            return Err(IngestError::NotAuthenticated);
        }
        Ok(())
    }

    /// Processes each file independently; a failure never aborts the rest
    /// of the batch. Returns the batch outcome; per-file states stay
    /// readable on the tracker until the grace period expires.
    pub async fn upload_batch(
        &self,
        files: &[UploadFile],
        collection_id: &str,
    ) -> Result<BatchReport, IngestError> {
        self.ensure_authenticated()?;

        if files.is_empty() {
            return Ok(BatchReport {
                total: 0,
                succeeded: 0,
                states: HashMap::new(),
            });
        }

        for file in files {
            self.tracker.begin(&file.name);
        }

        let mut succeeded = 0usize;
        for file in files {
            match self.ingest_file(file, collection_id).await {
                Ok(()) => succeeded += 1,
                Err(IngestError::DuplicateFile(message)) => {
                    debug!(file = %file.name, "skipping duplicate upload");
                    self.tracker.reject_duplicate(&file.name, &message);
                }
                Err(error) => {
                    warn!(file = %file.name, error = %error, "file ingestion failed");
                    self.tracker.fail(&file.name, &error.to_string());
                }
            }
        }

        let report = BatchReport {
            total: files.len(),
            succeeded,
            states: self.tracker.snapshot(),
        };
        info!(
            collection_id = %collection_id,
            total = report.total,
            succeeded = report.succeeded,
            "upload batch resolved"
        );

        if succeeded > 0 {
            if let Some(hook) = &self.completion_hook {
                hook(&report);
            }
        }

        let tracker = self.tracker.clone();
        let grace = self.options.clear_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracker.clear();
        });

        Ok(report)
    }

    async fn ingest_file(&self, file: &UploadFile, collection_id: &str) -> Result<(), IngestError> {
        if self
            .store
            .find_document_by_name(collection_id, &file.name)
            .await?
            .is_some()
        {
            return Err(IngestError::DuplicateFile(format!(
                "a file named \"{}\" already exists in this collection",
                file.name
            )));
        }

        self.tracker.advance(&file.name, UploadStage::Uploading)?;
        let object_path = format!(
            "{}/{}/{}",
            self.auth.user_id,
            collection_id,
            storage_filename(&file.name)
        );
        let content_type = if file.content_type.trim().is_empty() {
            "application/octet-stream"
        } else {
            file.content_type.as_str()
        };
        let full_path = self
            .blobs
            .put(&object_path, &file.bytes, content_type)
            .await
            .map_err(|error| IngestError::BlobUpload(error.to_string()))?;

        // The store's uniqueness constraint re-verifies the name here; a
        // lost race against a concurrent writer surfaces as a conflict.
        let document = match self
            .store
            .insert_document(&NewDocument {
                name: file.name.clone(),
                collection_id: collection_id.to_string(),
                owner_id: self.auth.user_id.clone(),
                storage_path: full_path.clone(),
            })
            .await
        {
            Ok(document) => document,
            Err(StoreError::Conflict(_)) => {
                if let Err(error) = self.blobs.remove(std::slice::from_ref(&full_path)).await {
                    warn!(path = %full_path, error = %error, "blob left behind after name conflict");
                }
                return Err(IngestError::DuplicateFile(format!(
                    "a file named \"{}\" already exists in this collection",
                    file.name
                )));
            }
            Err(error) => return Err(error.into()),
        };
        debug!(file = %file.name, document_id = %document.id, "document metadata inserted");

        self.tracker.advance(&file.name, UploadStage::Extracting)?;
        let text = extract_text(&file.bytes, content_type)?;
        if text.trim().is_empty() {
            warn!(file = %file.name, "no text extracted; document will have zero chunks");
        }

        self.tracker.advance(&file.name, UploadStage::Chunking)?;
        let chunks = chunk_text(&text, &self.options.chunking);

        self.tracker.advance(&file.name, UploadStage::Embedding)?;
        let inputs: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&inputs).await?;
        if embeddings.len() != chunks.len() {
            return Err(IngestError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        self.tracker.advance(&file.name, UploadStage::Persisting)?;
        if !chunks.is_empty() {
            let rows: Vec<NewChunk> = chunks
                .iter()
                .zip(embeddings.iter())
                .map(|(chunk, embedding)| NewChunk {
                    owner_id: self.auth.user_id.clone(),
                    document_id: document.id.clone(),
                    content: chunk.text.clone(),
                    embedding: embedding.clone(),
                })
                .collect();
            self.store.insert_chunks(&rows).await?;
        }

        self.tracker.advance(&file.name, UploadStage::Done)?;
        info!(
            file = %file.name,
            document_id = %document.id,
            chunk_count = chunks.len(),
            "file ingested"
        );
        Ok(())
    }

    /// Removes the blob first, then the metadata row. If the blob removal
    /// reports no matching object the metadata row is left untouched.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), IngestError> {
        self.ensure_authenticated()?;

        let document = self
            .store
            .fetch_document(document_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(document_id.to_string()))?;

        if document.owner_id != self.auth.user_id {
            return Err(IngestError::NotAuthorized(format!(
                "document {document_id} belongs to another user"
            )));
        }

        let removed = self
            .blobs
            .remove(std::slice::from_ref(&document.storage_path))
            .await
            .map_err(|error| IngestError::BlobRemoval(error.to_string()))?;
        if removed.is_empty() {
            return Err(IngestError::BlobRemoval(format!(
                "no object removed at {}",
                document.storage_path
            )));
        }

        self.store.delete_document(document_id).await?;
        info!(document_id = %document_id, "document deleted");
        Ok(())
    }

    pub async fn create_collection(&self, name: &str) -> Result<Collection, IngestError> {
        self.ensure_authenticated()?;

        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(IngestError::InvalidArgument(
                "collection name cannot be empty".to_string(),
            ));
        }

        Ok(self
            .store
            .create_collection(&self.auth.user_id, trimmed)
            .await?)
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>, IngestError> {
        self.ensure_authenticated()?;
        Ok(self.store.list_collections(&self.auth.user_id).await?)
    }

    pub async fn delete_collection(&self, collection_id: &str) -> Result<(), IngestError> {
        self.ensure_authenticated()?;
        Ok(self
            .store
            .delete_collection(collection_id, &self.auth.user_id)
            .await?)
    }

    pub async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>, IngestError> {
        self.ensure_authenticated()?;
        Ok(self.store.list_documents(collection_id).await?)
    }
}

// Display names stay human-readable in metadata; the stored object gets a
// collision-free name so equal filenames across users or collections can
// never clash in the bucket.
fn storage_filename(display_name: &str) -> String {
    let extension = std::path::Path::new(display_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{}{}", Uuid::new_v4(), extension)
}
