use std::path::PathBuf;

use scanpest_core::config::normalize_base_url;

use crate::cli::ConfigCommands;
use crate::commands::common::CommandContext;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    context: &CommandContext,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            user_id,
            media_dir,
            request_timeout_secs,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                api_base_url,
                user_id,
                media_dir,
                request_timeout_secs,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(context),
    }
}

/// Fields given on the command line; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub user_id: Option<i64>,
    pub media_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    apply_profile_update(config.profile_mut_or_default(&profile_name), update)?;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profiles
        .get(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_profile_fields(profile);
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `scanpest sync` with SCANPEST_TOKEN set.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }
    Ok(())
}

pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(update.api_base_url) {
        profile.api_base_url = Some(normalize_base_url(&url)?);
    }
    if let Some(user_id) = update.user_id {
        profile.user_id = Some(user_id);
    }
    if let Some(media_dir) = update.media_dir {
        profile.media_dir = Some(media_dir);
    }
    if let Some(secs) = update.request_timeout_secs {
        if secs == 0 {
            return Err(CliError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        profile.request_timeout_secs = Some(secs);
    }
    Ok(())
}

pub fn missing_profile_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.api_base_url.is_none() {
        missing.push("api_base_url");
    }
    if profile.user_id.is_none() {
        missing.push("user_id");
    }
    missing
}

fn run_config_show(context: &CommandContext) -> Result<(), CliError> {
    let config = context.client_config()?;
    println!("profile:      {}", context.profile_name);
    println!("database:     {}", context.db_path.display());
    println!(
        "api_base_url: {}",
        config.api_base_url.as_deref().unwrap_or("(not set)")
    );
    match context.user_id() {
        Ok(user_id) => println!("user_id:      {user_id}"),
        Err(_) => println!("user_id:      (not set)"),
    }
    println!("media_dir:    {}", context.media_dir(&config).display());
    if let Some(secs) = config.request_timeout_secs {
        println!("timeout:      {secs}s");
    }
    Ok(())
}
