use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "incident-bot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub notion: NotionConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub digest: DigestConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    pub digest_channel_id: Option<String>,
    /// Workspace subdomain used to build `archives` permalinks. Without it the
    /// bot falls back to `app_redirect` links.
    pub workspace_domain: Option<String>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct NotionConfig {
    pub token: SecretString,
    pub incidents_database_id: String,
    pub teams_database_id: Option<String>,
    pub api_base_url: String,
    pub api_version: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub step_timeout_secs: u64,
    pub thread_fetch_limit: u32,
    pub teams_refresh_secs: u64,
    pub display_timezone: Tz,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DigestConfig {
    pub enabled: bool,
    pub hour: u32,
    pub timezone: Tz,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_digest_channel_id: Option<String>,
    pub notion_token: Option<String>,
    pub notion_incidents_database_id: Option<String>,
    pub notion_teams_database_id: Option<String>,
    pub server_port: Option<u16>,
    pub digest_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
                digest_channel_id: None,
                workspace_domain: None,
                api_base_url: "https://slack.com/api".to_string(),
            },
            notion: NotionConfig {
                token: String::new().into(),
                incidents_database_id: String::new(),
                teams_database_id: None,
                api_base_url: "https://api.notion.com/v1".to_string(),
                api_version: "2022-06-28".to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig {
                step_timeout_secs: 10,
                thread_fetch_limit: 30,
                teams_refresh_secs: 300,
                display_timezone: Tz::UTC,
                request_timeout_secs: 15,
            },
            digest: DigestConfig { enabled: false, hour: 9, timezone: Tz::Europe__Warsaw },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The channel the digest and new-incident summaries go to, if any.
    pub fn digest_channel(&self) -> Option<&str> {
        self.slack.digest_channel_id.as_deref().filter(|channel| !channel.trim().is_empty())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(digest_channel_id) = slack.digest_channel_id {
                self.slack.digest_channel_id = Some(digest_channel_id);
            }
            if let Some(workspace_domain) = slack.workspace_domain {
                self.slack.workspace_domain = Some(workspace_domain);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(notion) = patch.notion {
            if let Some(token) = notion.token {
                self.notion.token = secret_value(token);
            }
            if let Some(incidents_database_id) = notion.incidents_database_id {
                self.notion.incidents_database_id = incidents_database_id;
            }
            if let Some(teams_database_id) = notion.teams_database_id {
                self.notion.teams_database_id = Some(teams_database_id);
            }
            if let Some(api_base_url) = notion.api_base_url {
                self.notion.api_base_url = api_base_url;
            }
            if let Some(api_version) = notion.api_version {
                self.notion.api_version = api_version;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(step_timeout_secs) = workflow.step_timeout_secs {
                self.workflow.step_timeout_secs = step_timeout_secs;
            }
            if let Some(thread_fetch_limit) = workflow.thread_fetch_limit {
                self.workflow.thread_fetch_limit = thread_fetch_limit;
            }
            if let Some(teams_refresh_secs) = workflow.teams_refresh_secs {
                self.workflow.teams_refresh_secs = teams_refresh_secs;
            }
            if let Some(display_timezone) = workflow.display_timezone {
                self.workflow.display_timezone =
                    parse_timezone("workflow.display_timezone", &display_timezone)?;
            }
            if let Some(request_timeout_secs) = workflow.request_timeout_secs {
                self.workflow.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(digest) = patch.digest {
            if let Some(enabled) = digest.enabled {
                self.digest.enabled = enabled;
            }
            if let Some(hour) = digest.hour {
                self.digest.hour = hour;
            }
            if let Some(timezone) = digest.timezone {
                self.digest.timezone = parse_timezone("digest.timezone", &timezone)?;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Bare names are accepted for deployments that predate the prefixed variables.
        if let Some(value) =
            read_env("INCIDENT_BOT_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"))
        {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_SLACK_SIGNING_SECRET")
            .or_else(|| read_env("SLACK_SIGNING_SECRET"))
        {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_SLACK_DIGEST_CHANNEL_ID")
            .or_else(|| read_env("SLACK_DIGEST_CHANNEL_ID"))
        {
            self.slack.digest_channel_id = Some(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_SLACK_WORKSPACE_DOMAIN") {
            self.slack.workspace_domain = Some(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) =
            read_env("INCIDENT_BOT_NOTION_TOKEN").or_else(|| read_env("NOTION_TOKEN"))
        {
            self.notion.token = secret_value(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_NOTION_INCIDENTS_DATABASE_ID")
            .or_else(|| read_env("NOTION_DB_ID"))
        {
            self.notion.incidents_database_id = value;
        }
        if let Some(value) = read_env("INCIDENT_BOT_NOTION_TEAMS_DATABASE_ID")
            .or_else(|| read_env("NOTION_TEAMS_DB_ID"))
        {
            self.notion.teams_database_id = Some(value);
        }
        if let Some(value) = read_env("INCIDENT_BOT_NOTION_API_BASE_URL") {
            self.notion.api_base_url = value;
        }
        if let Some(value) = read_env("INCIDENT_BOT_NOTION_API_VERSION") {
            self.notion.api_version = value;
        }

        if let Some(value) = read_env("INCIDENT_BOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port_key = if read_env("INCIDENT_BOT_SERVER_PORT").is_some() {
            "INCIDENT_BOT_SERVER_PORT"
        } else {
            "PORT"
        };
        if let Some(value) = read_env(port_key) {
            self.server.port = parse_env(port_key, &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("INCIDENT_BOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("INCIDENT_BOT_WORKFLOW_STEP_TIMEOUT_SECS") {
            self.workflow.step_timeout_secs =
                parse_env("INCIDENT_BOT_WORKFLOW_STEP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_WORKFLOW_THREAD_FETCH_LIMIT") {
            self.workflow.thread_fetch_limit =
                parse_env("INCIDENT_BOT_WORKFLOW_THREAD_FETCH_LIMIT", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_WORKFLOW_TEAMS_REFRESH_SECS") {
            self.workflow.teams_refresh_secs =
                parse_env("INCIDENT_BOT_WORKFLOW_TEAMS_REFRESH_SECS", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_WORKFLOW_DISPLAY_TIMEZONE") {
            self.workflow.display_timezone =
                parse_env("INCIDENT_BOT_WORKFLOW_DISPLAY_TIMEZONE", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_WORKFLOW_REQUEST_TIMEOUT_SECS") {
            self.workflow.request_timeout_secs =
                parse_env("INCIDENT_BOT_WORKFLOW_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INCIDENT_BOT_DIGEST_ENABLED") {
            self.digest.enabled = parse_env("INCIDENT_BOT_DIGEST_ENABLED", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_DIGEST_HOUR") {
            self.digest.hour = parse_env("INCIDENT_BOT_DIGEST_HOUR", &value)?;
        }
        if let Some(value) = read_env("INCIDENT_BOT_DIGEST_TIMEZONE") {
            self.digest.timezone = parse_env("INCIDENT_BOT_DIGEST_TIMEZONE", &value)?;
        }

        let log_level =
            read_env("INCIDENT_BOT_LOGGING_LEVEL").or_else(|| read_env("INCIDENT_BOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INCIDENT_BOT_LOGGING_FORMAT").or_else(|| read_env("INCIDENT_BOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(digest_channel_id) = overrides.slack_digest_channel_id {
            self.slack.digest_channel_id = Some(digest_channel_id);
        }
        if let Some(token) = overrides.notion_token {
            self.notion.token = secret_value(token);
        }
        if let Some(incidents_database_id) = overrides.notion_incidents_database_id {
            self.notion.incidents_database_id = incidents_database_id;
        }
        if let Some(teams_database_id) = overrides.notion_teams_database_id {
            self.notion.teams_database_id = Some(teams_database_id);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.digest_enabled {
            self.digest.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_notion(&self.notion)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_digest(&self.digest, self.digest_channel())?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/incident-bot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || !matches!(chars.peek(), Some('{')) {
            output.push(ch);
            continue;
        }
        chars.next();

        let mut key = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(next) => key.push(next),
                None => return Err(ConfigError::UnterminatedInterpolation),
            }
        }

        let value =
            env::var(&key).map_err(|_| ConfigError::MissingEnvInterpolation { var: key })?;
        output.push_str(&value);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps"
                .to_string(),
        ));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
        ));
    }

    require_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_notion(notion: &NotionConfig) -> Result<(), ConfigError> {
    if notion.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.token is required. Create an internal integration at https://www.notion.so/my-integrations".to_string(),
        ));
    }

    if notion.incidents_database_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.incidents_database_id is required and the database must be shared with the integration".to_string(),
        ));
    }

    if notion.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("notion.api_version must not be empty".to_string()));
    }

    require_http_url("notion.api_base_url", &notion.api_base_url)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.step_timeout_secs == 0 || workflow.step_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "workflow.step_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if workflow.request_timeout_secs == 0 || workflow.request_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "workflow.request_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if workflow.thread_fetch_limit == 0 || workflow.thread_fetch_limit > 1000 {
        return Err(ConfigError::Validation(
            "workflow.thread_fetch_limit must be in range 1..=1000".to_string(),
        ));
    }

    if workflow.teams_refresh_secs < 10 {
        return Err(ConfigError::Validation(
            "workflow.teams_refresh_secs must be at least 10".to_string(),
        ));
    }

    Ok(())
}

fn validate_digest(digest: &DigestConfig, channel: Option<&str>) -> Result<(), ConfigError> {
    if digest.hour > 23 {
        return Err(ConfigError::Validation("digest.hour must be in range 0..=23".to_string()));
    }

    if digest.enabled && channel.is_none() {
        return Err(ConfigError::Validation(
            "digest.enabled is true but slack.digest_channel_id is not set".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_timezone(key: &str, value: &str) -> Result<Tz, ConfigError> {
    value.trim().parse::<Tz>().map_err(|_| {
        ConfigError::Validation(format!("{key} must be an IANA timezone name, got `{value}`"))
    })
}

/// Parses an override, reporting the variable name on failure. `Tz` parses too.
fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    notion: Option<NotionPatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    digest: Option<DigestPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    digest_channel_id: Option<String>,
    workspace_domain: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotionPatch {
    token: Option<String>,
    incidents_database_id: Option<String>,
    teams_database_id: Option<String>,
    api_base_url: Option<String>,
    api_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    step_timeout_secs: Option<u64>,
    thread_fetch_limit: Option<u32>,
    teams_refresh_secs: Option<u64>,
    display_timezone: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DigestPatch {
    enabled: Option<bool>,
    hour: Option<u32>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
