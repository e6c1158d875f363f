use crate::models::UploadStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("duplicate file name: {0}")]
    DuplicateFile(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("blob upload failed: {0}")]
    BlobUpload(String),

    #[error("blob removal failed: {0}")]
    BlobRemoval(String),

    #[error("store write failed: {0}")]
    StoreWrite(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal upload stage transition: {from:?} -> {to:?}")]
    IllegalTransition { from: UploadStage, to: UploadStage },
}

impl From<StoreError> for IngestError {
    fn from(error: StoreError) -> Self {
        IngestError::StoreWrite(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("ranking procedure failed: {0}")]
    Rpc(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
