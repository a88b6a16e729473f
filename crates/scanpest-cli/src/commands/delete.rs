use crate::commands::common::{load_detection, open_store, CommandContext};
use crate::error::CliError;

pub async fn run_delete(
    id: Option<&str>,
    pest: Option<&str>,
    all: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;

    if let Some(id) = id {
        let detection = load_detection(&store, id, user_id).await?;
        store.delete_detection(detection.id).await?;
        println!("{}", detection.id);
        return Ok(());
    }

    let deleted = if let Some(pest) = pest {
        store.delete_by_pest(user_id, pest).await?
    } else if all {
        store.delete_all(user_id).await?
    } else {
        0
    };
    println!("Deleted {deleted} detection(s)");
    Ok(())
}
