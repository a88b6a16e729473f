//! Request and response bodies of the detection server.

use serde::{Deserialize, Serialize};

use crate::models::{BoundingBox, Detection, NoteUpdate};

#[derive(Debug, Serialize)]
pub(super) struct IdsRequest<'a> {
    pub ids: &'a [String],
}

#[derive(Debug, Serialize)]
pub(super) struct SoftDeleteRequest<'a> {
    pub server_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(super) struct SoftDeletedResponse {
    #[serde(default)]
    pub deleted_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct NotesRequest<'a> {
    pub detections: &'a [NoteUpdate],
}

#[derive(Debug, Deserialize)]
pub(super) struct NotesResponse {
    #[serde(default)]
    pub detections: Vec<NoteUpdate>,
}

/// Answer to a fetch-by-ids request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchResponse {
    /// Detections the server holds that the phone lacks
    #[serde(default)]
    pub detections_to_send: Vec<RemoteDetection>,
    /// Server ids the server wants uploaded from the phone
    #[serde(default)]
    pub detections_needed_from_phone: Vec<String>,
}

/// A detection as sent by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteDetection {
    pub detection: RemoteDetectionRecord,
    #[serde(rename = "boundingBoxes", default)]
    pub bounding_boxes: Vec<RemoteBox>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDetectionRecord {
    pub server_id: String,
    pub image_uri: String,
    pub timestamp: i64,
    pub detection_date: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub cnf: f32,
    pub cls: i32,
    #[serde(rename = "clsName")]
    pub cls_name: String,
}

impl From<RemoteBox> for BoundingBox {
    fn from(value: RemoteBox) -> Self {
        Self {
            x1: value.x1,
            y1: value.y1,
            x2: value.x2,
            y2: value.y2,
            cx: value.cx,
            cy: value.cy,
            w: value.w,
            h: value.h,
            confidence: value.cnf,
            class_index: value.cls,
            class_name: value.cls_name,
        }
    }
}

/// One detection in an upload batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadDetection {
    #[serde(rename = "serverid")]
    pub server_id: String,
    pub timestamp: i64,
    pub detection_date: i64,
    pub note: Option<String>,
    /// Multipart key of the image part
    pub image: String,
    pub bounding_boxes: Vec<UploadBox>,
    #[serde(rename = "updated_at1")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub cnf: f32,
    pub cls: i32,
    pub cls_name: String,
}

impl From<&BoundingBox> for UploadBox {
    fn from(value: &BoundingBox) -> Self {
        Self {
            x1: value.x1,
            y1: value.y1,
            x2: value.x2,
            y2: value.y2,
            cx: value.cx,
            cy: value.cy,
            w: value.w,
            h: value.h,
            cnf: value.confidence,
            cls: value.class_index,
            cls_name: value.class_name.clone(),
        }
    }
}

/// Image bytes attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadImage {
    pub key: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Detections plus image parts, sent as one multipart request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadBatch {
    pub detections: Vec<UploadDetection>,
    pub images: Vec<UploadImage>,
}

impl UploadBatch {
    /// Add a detection with its image, proposing `server_id` as its identity.
    pub fn push(
        &mut self,
        detection: &Detection,
        server_id: &str,
        file_name: &str,
        image_bytes: Vec<u8>,
    ) {
        let key = format!("image_{}", self.detections.len());
        self.detections.push(UploadDetection {
            server_id: server_id.to_string(),
            timestamp: detection.captured_at,
            detection_date: detection.detected_at,
            note: detection.note.clone(),
            image: key.clone(),
            bounding_boxes: detection.boxes.iter().map(UploadBox::from).collect(),
            updated_at: detection.updated_at,
        });
        self.images.push(UploadImage {
            key,
            file_name: file_name.to_string(),
            content_type: mime_guess::from_path(file_name)
                .first_or_octet_stream()
                .to_string(),
            bytes: image_bytes,
        });
    }

    /// Serialized `detections` part.
    pub fn detections_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.detections)
    }
}

/// Server acknowledgement of an upload.
///
/// Servers that echo nothing leave `server_ids` empty; the proposed ids are
/// then taken as accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadAck {
    #[serde(default, alias = "serverIds", alias = "ids")]
    pub server_ids: Vec<String>,
}

impl UploadAck {
    /// Parse a response body, treating non-JSON bodies as an empty ack.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}
