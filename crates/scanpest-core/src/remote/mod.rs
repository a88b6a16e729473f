//! Detection server client.

mod http;
mod wire;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::NoteUpdate;

pub use http::HttpDetectionService;
pub use wire::{
    FetchResponse, RemoteBox, RemoteDetection, RemoteDetectionRecord, UploadAck, UploadBatch,
    UploadBox, UploadDetection, UploadImage,
};

/// Opaque bearer credential for the detection server.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> RemoteResult<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "auth token must not be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Token {}", self.0)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_tuple("AuthToken").field(&"[REDACTED]").finish()
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid server configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Server request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server rejected request: {message} ({status})")]
    Rejected { status: u16, message: String },
    #[error("Invalid server payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the detection server offers to a synchronizing client.
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Send the server ids known locally; learn what each side is missing.
    async fn fetch_by_ids(&self, token: &AuthToken, ids: &[String])
        -> RemoteResult<FetchResponse>;

    /// Upload detections together with their images.
    async fn upload_batch(&self, token: &AuthToken, batch: UploadBatch)
        -> RemoteResult<UploadAck>;

    /// Mark detections deleted on the server.
    async fn soft_delete(&self, token: &AuthToken, server_ids: &[String]) -> RemoteResult<()>;

    /// Server ids the server considers deleted.
    async fn soft_deleted_ids(&self, token: &AuthToken) -> RemoteResult<Vec<String>>;

    /// Send pending note edits; returns the canonical notes.
    async fn update_notes(
        &self,
        token: &AuthToken,
        notes: &[NoteUpdate],
    ) -> RemoteResult<Vec<NoteUpdate>>;

    /// Fetch image bytes referenced by a pulled detection.
    async fn download_image(&self, token: &AuthToken, image_ref: &str) -> RemoteResult<Vec<u8>>;
}
