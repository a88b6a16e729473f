use std::path::Path;

use scanpest_core::util::unix_millis_now;

use crate::commands::common::{open_store, parse_box_spec, CommandContext};
use crate::error::CliError;

pub async fn run_record(
    image: &Path,
    box_specs: &[String],
    captured_at: Option<i64>,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let boxes = box_specs
        .iter()
        .map(|spec| parse_box_spec(spec))
        .collect::<Result<Vec<_>, _>>()?;
    let image_ref = std::fs::canonicalize(image)?;

    let store = open_store(&context.db_path)?;
    let detection = store
        .record_detection(
            user_id,
            &image_ref.to_string_lossy(),
            captured_at.unwrap_or_else(unix_millis_now),
            boxes,
        )
        .await?;

    println!("{}", detection.id);
    Ok(())
}
