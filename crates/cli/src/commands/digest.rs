use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use incident_core::config::{AppConfig, LoadOptions};
use incident_core::TeamDirectory;
use incident_notion::{DocumentStore, NotionHttpClient, NotionTeamSource, TeamsCache};
use incident_slack::{ChatPlatform, SlackWebClient};
use incident_workflow::{DailyDigest, DigestRun};
use tracing::warn;

use super::{block_on, CommandResult, EXIT_CONFIG, EXIT_RUNTIME};

const COMMAND: &str = "digest";

/// Runs the unassigned-incident digest once. With `dry_run` the rendered
/// blocks are printed and nothing is posted.
pub fn run(dry_run: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG),
    };

    let channel_id = match (config.digest_channel(), dry_run) {
        (Some(channel_id), _) => channel_id.to_string(),
        (None, true) => String::new(),
        (None, false) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                "slack.digest_channel_id is required to post the digest",
                EXIT_CONFIG,
            )
        }
    };

    let digest = match build_digest(&config, channel_id) {
        Ok(digest) => digest,
        Err(error) => return CommandResult::failure(COMMAND, "client_setup", error, EXIT_RUNTIME),
    };

    let outcome = block_on(async {
        if let Err(error) = digest.teams.refresh().await {
            warn!(event_name = "digest.teams_unavailable", error = %error, "team names unavailable for digest");
        }
        if dry_run {
            preview(&digest.digest).await
        } else {
            post(&digest.digest).await
        }
    });

    match outcome {
        Ok(Ok(message)) => CommandResult::success(COMMAND, message),
        Ok(Err(error)) | Err(error) => CommandResult::failure(COMMAND, "runtime", error, EXIT_RUNTIME),
    }
}

struct DigestParts {
    digest: DailyDigest,
    teams: Arc<TeamsCache>,
}

fn build_digest(config: &AppConfig, channel_id: String) -> Result<DigestParts, String> {
    let timeout = Duration::from_secs(config.workflow.request_timeout_secs);
    let chat: Arc<dyn ChatPlatform> = Arc::new(
        SlackWebClient::new(&config.slack, timeout).map_err(|error| format!("slack client setup failed: {error}"))?,
    );
    let store: Arc<dyn DocumentStore> = Arc::new(
        NotionHttpClient::new(&config.notion, timeout)
            .map_err(|error| format!("notion client setup failed: {error}"))?,
    );

    let source = Arc::new(NotionTeamSource::new(Arc::clone(&store), config.notion.teams_database_id.clone()));
    let teams = TeamsCache::new(source, Duration::from_secs(config.workflow.teams_refresh_secs));
    let directory: Arc<dyn TeamDirectory> = teams.clone();

    let digest = DailyDigest::new(
        chat,
        store,
        directory,
        config.notion.incidents_database_id.clone(),
        channel_id,
        config.digest.timezone,
    );
    Ok(DigestParts { digest, teams })
}

async fn preview(digest: &DailyDigest) -> Result<String, String> {
    match digest.preview(Utc::now()).await.map_err(|error| error.to_string())? {
        Some((count, message)) => {
            let blocks = serde_json::to_string_pretty(&message).map_err(|error| error.to_string())?;
            Ok(format!("dry run: {count} unassigned incident(s)\n{blocks}"))
        }
        None => Ok("dry run: no unassigned incidents".to_string()),
    }
}

async fn post(digest: &DailyDigest) -> Result<String, String> {
    match digest.run_once(Utc::now()).await.map_err(|error| error.to_string())? {
        DigestRun::Posted { incident_count, ts } => {
            Ok(format!("posted digest of {incident_count} unassigned incident(s) at ts {ts}"))
        }
        DigestRun::NothingToReport => Ok("no unassigned incidents; nothing posted".to_string()),
    }
}
