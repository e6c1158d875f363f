use crate::error::StoreError;
use crate::traits::BlobStore;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub base_url: String,
    pub bucket: String,
    pub api_key: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl BucketConfig {
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let parsed = Url::parse(base_url)?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: api_key.into(),
            access_token: access_token.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

/// Object storage over a bucket-scoped HTTP API. Uploads return the full
/// stored path (`bucket/object-path`); removals return the objects the
/// server actually removed, so an empty response means nothing matched.
pub struct BucketStore {
    config: BucketConfig,
    client: Client,
}

impl BucketStore {
    pub fn new(config: BucketConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.config.base_url, self.config.bucket, path
        )
    }

    fn bucket_url(&self) -> String {
        format!("{}/object/{}", self.config.base_url, self.config.bucket)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.access_token)
    }

    // Stored paths may carry the bucket prefix; the removal endpoint wants
    // bucket-relative paths.
    fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(&format!("{}/", self.config.bucket))
            .unwrap_or(path)
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
                backend: "object-storage".to_string(),
                details: format!("{status}: {details}"),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BlobStore for BucketStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        let response = self
            .authed(self.client.post(self.object_url(path)))
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()
            .await?;

        let payload: Value = Self::expect_success(response).await?.json().await?;
        let full_path = payload
            .pointer("/Key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}", self.config.bucket, path));

        Ok(full_path)
    }

    async fn remove(&self, paths: &[String]) -> Result<Vec<String>, StoreError> {
        let prefixes: Vec<&str> = paths.iter().map(|path| self.relative_path(path)).collect();

        let response = self
            .authed(self.client.delete(self.bucket_url()))
            .json(&json!({ "prefixes": prefixes }))
            .send()
            .await?;

        let payload: Value = Self::expect_success(response).await?.json().await?;
        let removed = payload
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item.pointer("/name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(removed)
    }
}
