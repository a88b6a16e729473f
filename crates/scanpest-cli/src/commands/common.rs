use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use scanpest_core::{BoundingBox, ClientConfig, Detection, DetectionId, DetectionStore};
use serde::Serialize;

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub const DB_PATH_ENV: &str = "SCANPEST_DB_PATH";
pub const USER_ID_ENV: &str = "SCANPEST_USER_ID";
pub const TOKEN_ENV: &str = "SCANPEST_TOKEN";

/// Values shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub db_path: PathBuf,
    pub profile_name: String,
    pub profile: CliProfile,
    pub user: Option<i64>,
}

impl CommandContext {
    pub fn resolve(
        db_path: Option<PathBuf>,
        profile: Option<&str>,
        user: Option<i64>,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        Ok(Self {
            db_path: resolve_db_path(db_path),
            profile_name,
            profile,
            user,
        })
    }

    pub fn user_id(&self) -> Result<i64, CliError> {
        resolve_user_id(
            self.user,
            env::var(USER_ID_ENV).ok(),
            self.profile.user_id,
        )
    }

    /// Profile settings with `SCANPEST_*` overrides, validated.
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        Ok(self.profile.client_config().with_env_overrides().validated()?)
    }

    pub fn media_dir(&self, config: &ClientConfig) -> PathBuf {
        config.media_dir.clone().unwrap_or_else(|| {
            self.db_path
                .parent()
                .map_or_else(|| PathBuf::from("media"), |parent| parent.join("media"))
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionListItem {
    pub id: i64,
    pub server_id: Option<String>,
    pub image: String,
    pub captured_at: i64,
    pub captured_at_iso: String,
    pub relative_time: String,
    pub pests: Vec<String>,
    pub boxes: usize,
    pub note: Option<String>,
    pub sync_status: String,
}

pub fn resolve_user_id(
    explicit: Option<i64>,
    env_value: Option<String>,
    profile_value: Option<i64>,
) -> Result<i64, CliError> {
    if let Some(user_id) = explicit {
        return Ok(user_id);
    }
    if let Some(raw) = normalize_text_option(env_value) {
        return raw
            .parse()
            .map_err(|_| CliError::Config(format!("{USER_ID_ENV} is not a number: {raw}")));
    }
    profile_value.ok_or(CliError::UserNotConfigured)
}

pub fn resolve_token(explicit: Option<String>, env_value: Option<String>) -> Result<String, CliError> {
    normalize_text_option(explicit)
        .or_else(|| normalize_text_option(env_value))
        .ok_or(CliError::TokenMissing)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scanpest")
        .join("scanpest.db")
}

pub fn open_store(path: &Path) -> Result<DetectionStore, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(DetectionStore::open_path(path)?)
}

pub fn parse_detection_id(raw: &str) -> Result<DetectionId, CliError> {
    raw.parse::<DetectionId>()
        .map_err(|_| CliError::InvalidDetectionId(raw.trim().to_string()))
}

/// Load a live detection owned by `user_id`.
pub async fn load_detection(
    store: &DetectionStore,
    raw_id: &str,
    user_id: i64,
) -> Result<Detection, CliError> {
    let id = parse_detection_id(raw_id)?;
    match store.get_detection(id).await? {
        Some(detection) if detection.user_id == user_id => Ok(detection),
        _ => Err(CliError::DetectionNotFound(id)),
    }
}

/// Parse `x1,y1,x2,y2,confidence,class_index,class_name`.
pub fn parse_box_spec(spec: &str) -> Result<BoundingBox, CliError> {
    let invalid = |reason: &str| CliError::InvalidBox {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = spec.splitn(7, ',').map(str::trim).collect();
    if parts.len() != 7 {
        return Err(invalid("expected 7 comma-separated fields"));
    }

    let mut numbers = [0.0_f32; 5];
    for (slot, raw) in numbers.iter_mut().zip(&parts[..5]) {
        *slot = raw
            .parse()
            .map_err(|_| invalid(&format!("'{raw}' is not a number")))?;
    }
    let class_index = parts[5]
        .parse()
        .map_err(|_| invalid(&format!("'{}' is not a class index", parts[5])))?;
    let class_name = parts[6];
    if class_name.is_empty() {
        return Err(invalid("class name cannot be empty"));
    }

    let [x1, y1, x2, y2, confidence] = numbers;
    let bbox = BoundingBox::from_corners((x1, y1), (x2, y2), confidence, class_index, class_name);
    bbox.validate()
        .map_err(|error| invalid(&error.to_string()))?;
    Ok(bbox)
}

pub fn format_detection_lines(detections: &[Detection]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    detections
        .iter()
        .map(|detection| {
            let relative_time = format_relative_time(detection.captured_at, now_ms);
            let pests = pest_summary(detection, 40);
            let status = detection.sync_status();
            format!(
                "{:>6}  {relative_time:<10}  {pests:<40}  {status}",
                detection.id.0
            )
        })
        .collect()
}

pub fn detection_to_list_item(detection: &Detection) -> DetectionListItem {
    let now_ms = Utc::now().timestamp_millis();
    DetectionListItem {
        id: detection.id.0,
        server_id: detection.server_id.clone(),
        image: detection.image_ref.clone(),
        captured_at: detection.captured_at,
        captured_at_iso: format_timestamp(detection.captured_at),
        relative_time: format_relative_time(detection.captured_at, now_ms),
        pests: detection
            .pest_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        boxes: detection.boxes.len(),
        note: detection.note.clone(),
        sync_status: detection.sync_status().to_string(),
    }
}

pub fn pest_summary(detection: &Detection, max_chars: usize) -> String {
    let names = detection.pest_names();
    if names.is_empty() {
        return "(no pests)".to_string();
    }
    let joined = names.join(", ");
    if joined.chars().count() <= max_chars {
        joined
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = joined.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
