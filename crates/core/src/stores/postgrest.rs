use crate::error::StoreError;
use crate::models::{
    Collection, Document, HybridSearchRequest, NewChunk, NewDocument, RankedChunk,
};
use crate::traits::DocumentStore;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use std::time::Duration;
use url::Url;

const COLLECTIONS_TABLE: &str = "collections";
const DOCUMENTS_TABLE: &str = "documents";
const CHUNKS_TABLE: &str = "document_sections";
const DEFAULT_RANKING_FN: &str = "hybrid_search";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    pub base_url: String,
    pub api_key: String,
    pub access_token: String,
    pub ranking_fn: String,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let parsed = Url::parse(base_url)?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: access_token.into(),
            ranking_fn: DEFAULT_RANKING_FN.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_ranking_fn(mut self, name: impl Into<String>) -> Self {
        self.ranking_fn = name.into();
        self
    }
}

/// Table access over a PostgREST-style REST endpoint. Filters travel as
/// query parameters, inserts as JSON bodies, and the fused ranking runs as
/// a named RPC on the server.
pub struct PostgrestStore {
    config: PostgrestConfig,
    client: Client,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.base_url, table)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rpc/{}", self.config.base_url, self.config.ranking_fn)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.access_token)
    }

    async fn expect_success(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status == StatusCode::CONFLICT {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::Conflict(details));
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: "postgrest".to_string(),
                details: format!("{status}: {details}"),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for PostgrestStore {
    async fn create_collection(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Collection, StoreError> {
        let response = self
            .authed(self.client.post(self.table_url(COLLECTIONS_TABLE)))
            .header("Prefer", "return=representation")
            .json(&json!({ "name": name, "owner_id": owner_id }))
            .send()
            .await?;

        let rows: Vec<Collection> = Self::expect_success(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "postgrest".to_string(),
                details: "insert returned no collection row".to_string(),
            })
    }

    async fn list_collections(&self, owner_id: &str) -> Result<Vec<Collection>, StoreError> {
        let response = self
            .authed(self.client.get(self.table_url(COLLECTIONS_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("owner_id", format!("eq.{owner_id}")),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;

        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn delete_collection(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.delete(self.table_url(COLLECTIONS_TABLE)))
            .query(&[
                ("id", format!("eq.{collection_id}")),
                ("owner_id", format!("eq.{owner_id}")),
            ])
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn find_document_by_name(
        &self,
        collection_id: &str,
        name: &str,
    ) -> Result<Option<Document>, StoreError> {
        let response = self
            .authed(self.client.get(self.table_url(DOCUMENTS_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("collection_id", format!("eq.{collection_id}")),
                ("name", format!("eq.{name}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Document> = Self::expect_success(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<Document, StoreError> {
        let response = self
            .authed(self.client.post(self.table_url(DOCUMENTS_TABLE)))
            .header("Prefer", "return=representation")
            .json(document)
            .send()
            .await?;

        let rows: Vec<Document> = Self::expect_success(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "postgrest".to_string(),
                details: "insert returned no document row".to_string(),
            })
    }

    async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>, StoreError> {
        let response = self
            .authed(self.client.get(self.table_url(DOCUMENTS_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("collection_id", format!("eq.{collection_id}")),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;

        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn fetch_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let response = self
            .authed(self.client.get(self.table_url(DOCUMENTS_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{document_id}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Document> = Self::expect_success(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_chunks(&self, rows: &[NewChunk]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .authed(self.client.post(self.table_url(CHUNKS_TABLE)))
            .json(rows)
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.delete(self.table_url(DOCUMENTS_TABLE)))
            .query(&[("id", format!("eq.{document_id}"))])
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn hybrid_search(
        &self,
        request: &HybridSearchRequest,
    ) -> Result<Vec<RankedChunk>, StoreError> {
        let response = self
            .authed(self.client.post(self.rpc_url()))
            .json(request)
            .send()
            .await?;

        Ok(Self::expect_success(response).await?.json().await?)
    }
}
