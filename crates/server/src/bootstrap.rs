use std::sync::Arc;
use std::time::Duration;

use incident_core::config::{AppConfig, ConfigError, LoadOptions};
use incident_core::TeamDirectory;
use incident_notion::{DocumentStore, NotionError, NotionHttpClient, NotionTeamSource, TeamsCache};
use incident_slack::{
    ChatPlatform, EventDispatcher, IncidentCommandHandler, ModalLauncher, ReportMessageHandler,
    SignatureVerifier, SlackApiError, SlackWebClient, ThreadFetcher, UrlVerificationHandler,
    ViewSubmissionHandler,
};
use incident_workflow::{DailyDigest, SubmissionOrchestrator, SubmissionSettings};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub chat: Arc<dyn ChatPlatform>,
    pub store: Arc<dyn DocumentStore>,
    pub teams: Arc<TeamsCache>,
    pub dispatcher: Arc<EventDispatcher>,
    pub verifier: Arc<SignatureVerifier>,
    pub digest: Option<Arc<DailyDigest>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] SlackApiError),
    #[error("notion client setup failed: {0}")]
    NotionClient(#[source] NotionError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds the HTTP clients, warms the teams cache and wires the handlers.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let request_timeout = Duration::from_secs(config.workflow.request_timeout_secs);
    let chat: Arc<dyn ChatPlatform> = Arc::new(
        SlackWebClient::new(&config.slack, request_timeout).map_err(BootstrapError::SlackClient)?,
    );
    let store: Arc<dyn DocumentStore> = Arc::new(
        NotionHttpClient::new(&config.notion, request_timeout).map_err(BootstrapError::NotionClient)?,
    );

    let source = Arc::new(NotionTeamSource::new(Arc::clone(&store), config.notion.teams_database_id.clone()));
    let teams = TeamsCache::new(source, Duration::from_secs(config.workflow.teams_refresh_secs));
    teams.initialize().await;
    info!(
        event_name = "system.bootstrap.teams_cache_ready",
        correlation_id = "bootstrap",
        team_count = teams.cache_info().team_count,
        "teams cache initialized"
    );

    Ok(assemble(config, chat, store, teams))
}

/// Wiring only; no I/O.
pub fn assemble(
    config: AppConfig,
    chat: Arc<dyn ChatPlatform>,
    store: Arc<dyn DocumentStore>,
    teams: Arc<TeamsCache>,
) -> Application {
    let directory: Arc<dyn TeamDirectory> = teams.clone();
    let dispatcher = Arc::new(build_dispatcher(&config, Arc::clone(&chat), Arc::clone(&store), Arc::clone(&directory)));
    let verifier = Arc::new(SignatureVerifier::new(config.slack.signing_secret.clone()));

    let digest = match (config.digest.enabled, config.digest_channel()) {
        (true, Some(channel_id)) => Some(Arc::new(DailyDigest::new(
            Arc::clone(&chat),
            Arc::clone(&store),
            directory,
            config.notion.incidents_database_id.clone(),
            channel_id,
            config.digest.timezone,
        ))),
        _ => None,
    };

    Application { config, chat, store, teams, dispatcher, verifier, digest }
}

pub fn build_dispatcher(
    config: &AppConfig,
    chat: Arc<dyn ChatPlatform>,
    store: Arc<dyn DocumentStore>,
    teams: Arc<dyn TeamDirectory>,
) -> EventDispatcher {
    let timezone = config.workflow.display_timezone;
    let launcher = Arc::new(ModalLauncher::new(Arc::clone(&chat), Arc::clone(&teams), timezone));
    let threads = Arc::new(ThreadFetcher::new(Arc::clone(&chat), timezone));
    let orchestrator =
        SubmissionOrchestrator::new(chat, store, threads, teams, SubmissionSettings::from_config(config));

    EventDispatcher::new()
        .with_handler(Arc::new(UrlVerificationHandler))
        .with_handler(Arc::new(IncidentCommandHandler::new(Arc::clone(&launcher))))
        .with_handler(Arc::new(ReportMessageHandler::new(launcher)))
        .with_handler(Arc::new(ViewSubmissionHandler::new(orchestrator)))
}
