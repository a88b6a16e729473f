use std::sync::Arc;

use scanpest_core::sync::{FlowReport, SyncOutcome, SyncReport};
use scanpest_core::{AuthToken, HttpDetectionService, SyncCoordinator, SyncState};

use crate::cli::SyncCommands;
use crate::commands::common::{open_store, resolve_token, CommandContext, TOKEN_ENV};
use crate::error::CliError;

pub async fn run_sync(
    command: Option<SyncCommands>,
    token: Option<String>,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let token = AuthToken::new(resolve_token(token, std::env::var(TOKEN_ENV).ok())?)?;
    let config = context.client_config()?;
    let service = HttpDetectionService::from_config(&config)?;
    let media_dir = context.media_dir(&config);
    let store = open_store(&context.db_path)?;

    tracing::info!(
        "Syncing user {} with {} (profile '{}')",
        user_id,
        service.base_url(),
        context.profile_name
    );

    let coordinator = SyncCoordinator::new(store, Arc::new(service), media_dir);
    let mut states = coordinator.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            tracing::debug!("Sync state: {}", *states.borrow());
        }
    });

    let report = match command.unwrap_or(SyncCommands::All) {
        SyncCommands::All => coordinator.sync_all(user_id, &token).await?,
        SyncCommands::Push => single(coordinator.push(user_id, &token).await?),
        SyncCommands::Pull => single(coordinator.pull(user_id, &token).await?),
        SyncCommands::Deletions => {
            single(coordinator.reconcile_deletions(user_id, &token).await?)
        }
        SyncCommands::Notes => single(coordinator.merge_notes(user_id, &token).await?),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    if report.outcome() == SyncOutcome::Failed {
        let reason = match coordinator.state() {
            SyncState::Failed { reason } => reason,
            other => other.to_string(),
        };
        return Err(CliError::SyncFailed(reason));
    }
    Ok(())
}

fn single(report: FlowReport) -> SyncReport {
    SyncReport {
        flows: vec![report],
    }
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    for flow in &report.flows {
        lines.push(flow.to_string());
        for failure in &flow.failures {
            lines.push(format!("  {}: {}", failure.reference, failure.reason));
        }
    }
    lines.push(format!("Sync {}", report.outcome()));
    lines
}
