//! Note merge unit

use serde::{Deserialize, Serialize};

/// A detection note as exchanged with the server during note merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub server_id: String,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_update_uses_server_field_names() {
        let update = NoteUpdate {
            server_id: "abc".to_string(),
            updated_at: Some(10),
            note: Some("leaf curl".to_string()),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["serverId"], "abc");
        assert_eq!(json["updatedAt"], 10);
        assert_eq!(json["note"], "leaf curl");
    }

    #[test]
    fn note_update_tolerates_missing_optional_fields() {
        let update: NoteUpdate = serde_json::from_str(r#"{"serverId":"abc"}"#).unwrap();
        assert_eq!(update.note, None);
        assert_eq!(update.updated_at, None);
    }
}
