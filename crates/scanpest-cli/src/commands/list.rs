use scanpest_core::SortOrder;
use serde::Serialize;

use crate::commands::common::{
    detection_to_list_item, format_detection_lines, format_timestamp, load_detection, open_store,
    CommandContext, DetectionListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct PestCount {
    pest: String,
    boxes: usize,
}

pub async fn run_list(
    pest: Option<&str>,
    ascending: bool,
    limit: Option<usize>,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;
    let order = if ascending {
        SortOrder::Ascending
    } else {
        SortOrder::Descending
    };

    let mut detections = store.list_detections(user_id, order, pest).await?;
    if let Some(limit) = limit {
        detections.truncate(limit);
    }

    if as_json {
        let json_items = detections
            .iter()
            .map(detection_to_list_item)
            .collect::<Vec<DetectionListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if detections.is_empty() {
        println!("No detections");
    } else {
        for line in format_detection_lines(&detections) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, context: &CommandContext) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;
    let detection = load_detection(&store, id, user_id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    println!("Detection {}", detection.id);
    println!("  image:     {}", detection.image_ref);
    println!("  captured:  {}", format_timestamp(detection.captured_at));
    println!("  detected:  {}", format_timestamp(detection.detected_at));
    println!(
        "  server id: {}",
        detection.server_id.as_deref().unwrap_or("-")
    );
    println!("  status:    {}", detection.sync_status());
    if let Some(note) = &detection.note {
        println!("  note:      {note}");
    }
    for (index, bbox) in detection.boxes.iter().enumerate() {
        println!(
            "  {:>2}. {:<20} {:>5.1}%  ({:.3}, {:.3}) - ({:.3}, {:.3})",
            index + 1,
            bbox.class_name,
            f64::from(bbox.confidence) * 100.0,
            bbox.x1,
            bbox.y1,
            bbox.x2,
            bbox.y2
        );
    }
    Ok(())
}

pub async fn run_stats(as_json: bool, context: &CommandContext) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let store = open_store(&context.db_path)?;
    let counts = store.pest_counts(user_id).await?;

    if as_json {
        let items = counts
            .into_iter()
            .map(|(pest, boxes)| PestCount { pest, boxes })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if counts.is_empty() {
        println!("No pests detected yet");
    } else {
        for (pest, boxes) in counts {
            println!("{pest:<24} {boxes:>6}");
        }
    }
    Ok(())
}
