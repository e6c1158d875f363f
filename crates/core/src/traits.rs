use crate::error::StoreError;
use crate::models::{
    Collection, Document, HybridSearchRequest, NewChunk, NewDocument, RankedChunk,
};
use async_trait::async_trait;

/// Authenticated table access. All calls are parameterized; implementations
/// must never build filters by string concatenation of caller input into a
/// query language.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_collection(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Collection, StoreError>;

    async fn list_collections(&self, owner_id: &str) -> Result<Vec<Collection>, StoreError>;

    /// Deletes a collection owned by `owner_id`. Documents and chunks under
    /// it are removed by the store's own cascade rules.
    async fn delete_collection(&self, collection_id: &str, owner_id: &str)
        -> Result<(), StoreError>;

    async fn find_document_by_name(
        &self,
        collection_id: &str,
        name: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Inserts a document row and returns it with generated id/timestamp.
    /// A (collection_id, name) uniqueness violation is `StoreError::Conflict`.
    async fn insert_document(&self, document: &NewDocument) -> Result<Document, StoreError>;

    async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>, StoreError>;

    async fn fetch_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Bulk insert; one call per batch of chunk rows.
    async fn insert_chunks(&self, rows: &[NewChunk]) -> Result<(), StoreError>;

    /// Deletes the document row; chunk rows cascade at the store level so
    /// chunks never outlive their document.
    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError>;

    /// Invokes the server-side fused lexical+vector ranking procedure.
    /// Rows come back ordered by descending fused score.
    async fn hybrid_search(
        &self,
        request: &HybridSearchRequest,
    ) -> Result<Vec<RankedChunk>, StoreError>;
}

/// Object storage seam: upload returns the full stored path, removal
/// returns the paths actually removed (empty means nothing matched).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;

    async fn remove(&self, paths: &[String]) -> Result<Vec<String>, StoreError>;
}
