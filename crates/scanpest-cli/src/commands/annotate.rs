use std::path::{Path, PathBuf};

use scanpest_core::annotate::{load_font, render_file};

use crate::commands::common::{load_detection, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_annotate(
    id: &str,
    output: Option<PathBuf>,
    font: Option<&Path>,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;
    let detection = load_detection(&store, id, user_id).await?;

    let source = PathBuf::from(&detection.image_ref);
    let output = output.unwrap_or_else(|| default_output_path(&source));
    let font = font.map(load_font).transpose()?;
    if font.is_none() && !detection.boxes.is_empty() {
        tracing::info!("No --font given; drawing boxes without labels");
    }

    render_file(&source, &output, &detection.boxes, font.as_ref())?;
    println!("{}", output.display());
    Ok(())
}

/// `<dir>/<stem>-annotated.png` next to the source image.
pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "detection".into(), |stem| stem.to_string_lossy());
    source.with_file_name(format!("{stem}-annotated.png"))
}
