//! `reqwest` implementation of [`DetectionService`].

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::wire::{
    IdsRequest, NotesRequest, NotesResponse, SoftDeleteRequest, SoftDeletedResponse,
};
use super::{
    AuthToken, DetectionService, FetchResponse, RemoteError, RemoteResult, UploadAck,
    UploadBatch,
};
use crate::config::{normalize_base_url, ClientConfig};
use crate::models::NoteUpdate;
use crate::util::is_http_url;

const FETCH_PATH: &str = "detection/fetch/";
const UPLOAD_PATH: &str = "detection/upload/";
const DELETE_BATCH_PATH: &str = "detection/delete/batch/";
const DELETED_PATH: &str = "detection/deleted/";
const NOTES_PATH: &str = "detection/sync/notes/";

/// HTTP client for the detection server.
#[derive(Clone)]
pub struct HttpDetectionService {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for HttpDetectionService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpDetectionService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpDetectionService {
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        Self::build(base_url, Client::builder())
    }

    /// Build from client configuration, honoring the request timeout.
    pub fn from_config(config: &ClientConfig) -> RemoteResult<Self> {
        let base_url = config
            .require_api_base_url()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Self::build(&base_url, builder)
    }

    fn build(base_url: &str, builder: reqwest::ClientBuilder) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url)
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URL for an image reference from a pulled detection.
    pub fn resolve_image_url(&self, image_ref: &str) -> String {
        let image_ref = image_ref.trim();
        if is_http_url(image_ref) {
            image_ref.to_string()
        } else {
            self.endpoint(image_ref)
        }
    }

    fn json_request<T: serde::Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        token: &AuthToken,
        body: Option<&T>,
    ) -> RemoteResult<Request> {
        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.build()?)
    }

    fn build_upload_request(&self, token: &AuthToken, batch: UploadBatch) -> RemoteResult<Request> {
        let detections = batch
            .detections_json()
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        let mut form = multipart::Form::new().text("detections", detections);
        for image in batch.images {
            let part = multipart::Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?;
            form = form.part(image.key, part);
        }

        Ok(self
            .client
            .post(self.endpoint(UPLOAD_PATH))
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .multipart(form)
            .build()?)
    }

    async fn execute(&self, request: Request) -> RemoteResult<Response> {
        let method = request.method().clone();
        let url = request.url().path().to_string();
        let response = self.client.execute(request).await?;
        let status = response.status();
        tracing::debug!("{method} {url} -> {}", status.as_u16());

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> RemoteResult<T> {
        let body = self.execute(request).await?.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            RemoteError::InvalidPayload(format!("{error}: {}", excerpt(&body)))
        })
    }
}

#[async_trait]
impl DetectionService for HttpDetectionService {
    async fn fetch_by_ids(
        &self,
        token: &AuthToken,
        ids: &[String],
    ) -> RemoteResult<FetchResponse> {
        let request =
            self.json_request(Method::POST, FETCH_PATH, token, Some(&IdsRequest { ids }))?;
        self.execute_json(request).await
    }

    async fn upload_batch(
        &self,
        token: &AuthToken,
        batch: UploadBatch,
    ) -> RemoteResult<UploadAck> {
        let request = self.build_upload_request(token, batch)?;
        let body = self.execute(request).await?.text().await?;
        Ok(UploadAck::from_body(&body))
    }

    async fn soft_delete(&self, token: &AuthToken, server_ids: &[String]) -> RemoteResult<()> {
        let request = self.json_request(
            Method::POST,
            DELETE_BATCH_PATH,
            token,
            Some(&SoftDeleteRequest { server_ids }),
        )?;
        self.execute(request).await?;
        Ok(())
    }

    async fn soft_deleted_ids(&self, token: &AuthToken) -> RemoteResult<Vec<String>> {
        let request = self.json_request::<()>(Method::GET, DELETED_PATH, token, None)?;
        let payload: SoftDeletedResponse = self.execute_json(request).await?;
        Ok(payload.deleted_ids)
    }

    async fn update_notes(
        &self,
        token: &AuthToken,
        notes: &[NoteUpdate],
    ) -> RemoteResult<Vec<NoteUpdate>> {
        let request = self.json_request(
            Method::POST,
            NOTES_PATH,
            token,
            Some(&NotesRequest { detections: notes }),
        )?;
        let payload: NotesResponse = self.execute_json(request).await?;
        Ok(payload.detections)
    }

    async fn download_image(&self, token: &AuthToken, image_ref: &str) -> RemoteResult<Vec<u8>> {
        let request = self
            .client
            .get(self.resolve_image_url(image_ref))
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .build()?;
        let bytes = self.execute(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

const ERROR_EXCERPT_CHARS: usize = 180;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
    detail: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error).or(payload.detail) {
            return excerpt(&message);
        }
    }

    let trimmed = excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

/// Leading part of a server body, short enough for an error message.
fn excerpt(body: &str) -> String {
    body.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, Detection, DetectionId};
    use pretty_assertions::assert_eq;

    fn service() -> HttpDetectionService {
        HttpDetectionService::new("https://api.example.com/").unwrap()
    }

    fn token() -> AuthToken {
        AuthToken::new("abc123").unwrap()
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(matches!(
            HttpDetectionService::new("api.example.com"),
            Err(RemoteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn from_config_requires_base_url() {
        assert!(matches!(
            HttpDetectionService::from_config(&ClientConfig::default()),
            Err(RemoteError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn fetch_request_shape_is_correct() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let request = service()
            .json_request(Method::POST, FETCH_PATH, &token(), Some(&IdsRequest { ids: &ids }))
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/detection/fetch/"
        );
        let auth = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(auth, "Token abc123");

        let body = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, serde_json::json!({"ids": ["a", "b"]}));
    }

    #[test]
    fn upload_request_is_multipart() {
        let detection = Detection {
            id: DetectionId(1),
            client_ref: "ref-1".to_string(),
            server_id: None,
            user_id: 1,
            image_ref: "/tmp/leaf.png".to_string(),
            captured_at: 1,
            detected_at: 2,
            note: None,
            updated_at: None,
            is_synced: false,
            is_deleted: false,
            note_pending: false,
            boxes: vec![BoundingBox::from_corners((0.1, 0.1), (0.2, 0.2), 0.5, 0, "mite")],
        };
        let mut batch = UploadBatch::default();
        batch.push(&detection, "ref-1", "leaf.png", vec![0, 1, 2]);

        let request = service().build_upload_request(&token(), batch).unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/detection/upload/"
        );
        let content_type = request
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    fn json_body(request: &Request) -> serde_json::Value {
        let body = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn soft_delete_request_lists_server_ids() {
        let server_ids = vec!["s-1".to_string()];
        let request = service()
            .json_request(
                Method::POST,
                DELETE_BATCH_PATH,
                &token(),
                Some(&SoftDeleteRequest {
                    server_ids: &server_ids,
                }),
            )
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/detection/delete/batch/"
        );
        assert_eq!(json_body(&request), serde_json::json!({"server_ids": ["s-1"]}));
    }

    #[test]
    fn notes_request_wraps_updates() {
        let notes = vec![NoteUpdate {
            server_id: "s-1".to_string(),
            updated_at: Some(5),
            note: None,
        }];
        let request = service()
            .json_request(
                Method::POST,
                NOTES_PATH,
                &token(),
                Some(&NotesRequest { detections: &notes }),
            )
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/detection/sync/notes/"
        );
        assert_eq!(
            json_body(&request),
            serde_json::json!({"detections": [{"serverId": "s-1", "updatedAt": 5, "note": null}]})
        );
    }

    #[test]
    fn deleted_ids_request_is_get_without_body() {
        let request = service()
            .json_request::<()>(Method::GET, DELETED_PATH, &token(), None)
            .unwrap();
        assert_eq!(request.method(), Method::GET);
        assert!(request.body().is_none());
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/detection/deleted/"
        );
    }

    #[test]
    fn resolve_image_url_handles_relative_refs() {
        let service = service();
        assert_eq!(
            service.resolve_image_url("/media/detections/a.png"),
            "https://api.example.com/media/detections/a.png"
        );
        assert_eq!(
            service.resolve_image_url("https://cdn.example.com/a.png"),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"detail": "Invalid token."}"#),
            "Invalid token."
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "  upstream down "),
            "upstream down"
        );
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, ""), "HTTP 404");
    }

    #[test]
    fn parse_api_error_cuts_long_html_pages() {
        let page = format!("<html><body>{}</body></html>", "gateway timeout ".repeat(40));
        let message = parse_api_error(StatusCode::GATEWAY_TIMEOUT, &page);
        assert_eq!(message.chars().count(), ERROR_EXCERPT_CHARS);
        assert!(message.starts_with("<html><body>gateway timeout"));
    }
}
