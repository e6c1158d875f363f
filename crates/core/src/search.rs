use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{AuthContext, HybridSearchRequest, RankedChunk};
use crate::traits::DocumentStore;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const DEFAULT_MATCH_COUNT: usize = 10;

// Repeated identical queries skip the embedding round trip; the memo is
// bounded and simply reset once full.
const QUERY_CACHE_CAP: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Blank query: no search was performed and previously displayed
    /// results should stay as they are.
    Skipped,
    /// Rows as returned by the store's fused ranking, best first.
    Ranked(Vec<RankedChunk>),
}

/// Stateless query path: embed the query once, then invoke the store's
/// server-side fused lexical+vector ranking. The engine does no local
/// re-ranking; the store's fusion decides the final order.
pub struct HybridSearchEngine<S, E> {
    store: S,
    embedder: E,
    auth: AuthContext,
    query_cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<S, E> HybridSearchEngine<S, E>
where
    S: DocumentStore,
    E: Embedder,
{
    pub fn new(store: S, embedder: E, auth: AuthContext) -> Self {
        Self {
            store,
            embedder,
            auth,
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        collection_id: &str,
        match_count: usize,
    ) -> Result<SearchOutcome, SearchError> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome::Skipped);
        }
        if self.auth.is_anonymous() {
            return Err(SearchError::NotAuthenticated);
        }

        let query_embedding = self.query_embedding(query).await?;

        let request = HybridSearchRequest {
            query_text: query.to_string(),
            query_embedding,
            collection_id: collection_id.to_string(),
            owner_id: self.auth.user_id.clone(),
            match_count,
        };

        let rows = self.store.hybrid_search(&request).await?;
        debug!(query = %query, hits = rows.len(), "hybrid search resolved");
        Ok(SearchOutcome::Ranked(rows))
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        if let Some(cached) = self.cache_get(query) {
            return Ok(cached);
        }

        let inputs = [query.to_string()];
        let mut vectors = self
            .embedder
            .embed(&inputs)
            .await
            .map_err(|error| SearchError::Embedding(error.to_string()))?;

        if vectors.is_empty() {
            return Err(SearchError::Embedding(
                "embedding service returned no vector".to_string(),
            ));
        }
        let embedding = vectors.swap_remove(0);

        self.cache_put(query, embedding.clone());
        Ok(embedding)
    }

    fn cache_get(&self, query: &str) -> Option<Vec<f32>> {
        self.query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .cloned()
    }

    fn cache_put(&self, query: &str, embedding: Vec<f32>) {
        let mut cache = self
            .query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if cache.len() >= QUERY_CACHE_CAP {
            cache.clear();
        }
        cache.insert(query.to_string(), embedding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IngestError, StoreError};
    use crate::models::{Collection, Document, NewChunk, NewDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRankingStore {
        rows: Vec<(String, String)>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeRankingStore {
        fn with_rows(rows: Vec<(&str, &str)>) -> Self {
            Self {
                rows: rows
                    .into_iter()
                    .map(|(id, content)| (id.to_string(), content.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FakeRankingStore {
        async fn create_collection(
            &self,
            _owner_id: &str,
            _name: &str,
        ) -> Result<Collection, StoreError> {
            unimplemented!("not exercised by search tests")
        }

        async fn list_collections(&self, _owner_id: &str) -> Result<Vec<Collection>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_collection(
            &self,
            _collection_id: &str,
            _owner_id: &str,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn find_document_by_name(
            &self,
            _collection_id: &str,
            _name: &str,
        ) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }

        async fn insert_document(&self, _document: &NewDocument) -> Result<Document, StoreError> {
            unimplemented!("not exercised by search tests")
        }

        async fn list_documents(&self, _collection_id: &str) -> Result<Vec<Document>, StoreError> {
            Ok(Vec::new())
        }

        async fn fetch_document(&self, _document_id: &str) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }

        async fn insert_chunks(&self, _rows: &[NewChunk]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_document(&self, _document_id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        // Naive stand-in for the server-side fusion: substring matches get
        // a positive reciprocal-rank score, best first.
        async fn hybrid_search(
            &self,
            request: &HybridSearchRequest,
        ) -> Result<Vec<RankedChunk>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::BackendResponse {
                    backend: "postgrest".to_string(),
                    details: "ranking function missing".to_string(),
                });
            }

            let needle = request.query_text.to_lowercase();
            let terms: Vec<&str> = needle.split_whitespace().collect();
            let mut hits: Vec<RankedChunk> = self
                .rows
                .iter()
                .filter(|(_, content)| {
                    let lowered = content.to_lowercase();
                    terms.iter().all(|term| lowered.contains(term))
                })
                .enumerate()
                .map(|(rank, (id, content))| RankedChunk {
                    id: id.clone(),
                    content: content.clone(),
                    rrf_score: 1.0 / (60.0 + rank as f64 + 1.0),
                })
                .collect();

            hits.truncate(request.match_count);
            Ok(hits)
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IngestError::Embedding("offline".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    fn engine(
        store: FakeRankingStore,
        embedder: CountingEmbedder,
    ) -> HybridSearchEngine<FakeRankingStore, CountingEmbedder> {
        HybridSearchEngine::new(store, embedder, AuthContext::new("user-1"))
    }

    #[tokio::test]
    async fn blank_query_performs_no_search() {
        let engine = engine(FakeRankingStore::with_rows(vec![]), CountingEmbedder::new());

        let outcome = engine.search("   ", "col-1", DEFAULT_MATCH_COUNT).await.unwrap();

        assert_eq!(outcome, SearchOutcome::Skipped);
        assert_eq!(engine.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn matching_chunk_is_returned_with_positive_score() {
        let store = FakeRankingStore::with_rows(vec![
            ("s1", "the annual budget forecast for next year"),
            ("s2", "meeting notes about hiring"),
        ]);
        let engine = engine(store, CountingEmbedder::new());

        let outcome = engine.search("budget forecast", "col-1", 5).await.unwrap();

        let SearchOutcome::Ranked(hits) = outcome else {
            panic!("expected ranked results");
        };
        assert!(hits.len() <= 5);
        assert_eq!(hits[0].id, "s1");
        assert!(hits[0].rrf_score > 0.0);
    }

    #[tokio::test]
    async fn rows_keep_the_store_order() {
        let store = FakeRankingStore::with_rows(vec![
            ("s1", "budget alpha"),
            ("s2", "budget beta"),
            ("s3", "budget gamma"),
        ]);
        let engine = engine(store, CountingEmbedder::new());

        let outcome = engine.search("budget", "col-1", 10).await.unwrap();

        let SearchOutcome::Ranked(hits) = outcome else {
            panic!("expected ranked results");
        };
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
        assert!(hits.windows(2).all(|pair| pair[0].rrf_score >= pair[1].rrf_score));
    }

    #[tokio::test]
    async fn repeated_query_reuses_the_cached_embedding() {
        let engine = engine(
            FakeRankingStore::with_rows(vec![("s1", "budget")]),
            CountingEmbedder::new(),
        );

        engine.search("budget", "col-1", 10).await.unwrap();
        engine.search("budget", "col-1", 10).await.unwrap();

        assert_eq!(engine.embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_as_search_error() {
        let engine = engine(
            FakeRankingStore::with_rows(vec![("s1", "budget")]),
            CountingEmbedder::failing(),
        );

        let result = engine.search("budget", "col-1", 10).await;

        assert!(matches!(result, Err(SearchError::Embedding(_))));
        assert_eq!(engine.store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ranking_failure_surfaces_as_search_error() {
        let engine = engine(FakeRankingStore::failing(), CountingEmbedder::new());

        let result = engine.search("budget", "col-1", 10).await;

        assert!(matches!(result, Err(SearchError::Rpc(_))));
    }

    #[tokio::test]
    async fn anonymous_caller_is_rejected() {
        let engine = HybridSearchEngine::new(
            FakeRankingStore::with_rows(vec![]),
            CountingEmbedder::new(),
            AuthContext::new(""),
        );

        let result = engine.search("budget", "col-1", 10).await;

        assert!(matches!(result, Err(SearchError::NotAuthenticated)));
        assert_eq!(engine.store.calls.load(Ordering::SeqCst), 0);
    }
}
