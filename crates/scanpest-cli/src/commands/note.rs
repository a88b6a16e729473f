use crate::commands::common::{load_detection, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_note(
    id: &str,
    text_parts: &[String],
    clear: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;
    let detection = load_detection(&store, id, user_id).await?;

    let updated = if clear {
        store.clear_note(detection.id).await?
    } else {
        let text = normalize_note_text(text_parts).ok_or(CliError::EmptyNote)?;
        store.set_note(detection.id, &text).await?
    };

    println!("{}  {}", updated.id, updated.sync_status());
    Ok(())
}

pub fn normalize_note_text(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
