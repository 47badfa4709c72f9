use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use incident_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// A config key, the environment variables that can set it (first match wins),
/// and how to render its effective value.
struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: fn(&AppConfig) -> String,
}

const FIELDS: &[Field] = &[
    Field {
        key: "slack.bot_token",
        env_keys: &["INCIDENT_BOT_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        value: |config| redact_token(&config.slack.bot_token),
    },
    Field {
        key: "slack.signing_secret",
        env_keys: &["INCIDENT_BOT_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        value: |config| redact_secret(&config.slack.signing_secret),
    },
    Field {
        key: "slack.digest_channel_id",
        env_keys: &["INCIDENT_BOT_SLACK_DIGEST_CHANNEL_ID", "SLACK_DIGEST_CHANNEL_ID"],
        value: |config| optional(config.slack.digest_channel_id.as_deref()),
    },
    Field {
        key: "slack.workspace_domain",
        env_keys: &["INCIDENT_BOT_SLACK_WORKSPACE_DOMAIN"],
        value: |config| optional(config.slack.workspace_domain.as_deref()),
    },
    Field {
        key: "slack.api_base_url",
        env_keys: &["INCIDENT_BOT_SLACK_API_BASE_URL"],
        value: |config| config.slack.api_base_url.clone(),
    },
    Field {
        key: "notion.token",
        env_keys: &["INCIDENT_BOT_NOTION_TOKEN", "NOTION_TOKEN"],
        value: |config| redact_token(&config.notion.token),
    },
    Field {
        key: "notion.incidents_database_id",
        env_keys: &["INCIDENT_BOT_NOTION_INCIDENTS_DATABASE_ID", "NOTION_DB_ID"],
        value: |config| config.notion.incidents_database_id.clone(),
    },
    Field {
        key: "notion.teams_database_id",
        env_keys: &["INCIDENT_BOT_NOTION_TEAMS_DATABASE_ID", "NOTION_TEAMS_DB_ID"],
        value: |config| optional(config.notion.teams_database_id.as_deref()),
    },
    Field {
        key: "notion.api_base_url",
        env_keys: &["INCIDENT_BOT_NOTION_API_BASE_URL"],
        value: |config| config.notion.api_base_url.clone(),
    },
    Field {
        key: "notion.api_version",
        env_keys: &["INCIDENT_BOT_NOTION_API_VERSION"],
        value: |config| config.notion.api_version.clone(),
    },
    Field {
        key: "server.bind_address",
        env_keys: &["INCIDENT_BOT_SERVER_BIND_ADDRESS"],
        value: |config| config.server.bind_address.clone(),
    },
    Field {
        key: "server.port",
        env_keys: &["INCIDENT_BOT_SERVER_PORT", "PORT"],
        value: |config| config.server.port.to_string(),
    },
    Field {
        key: "server.graceful_shutdown_secs",
        env_keys: &["INCIDENT_BOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        value: |config| config.server.graceful_shutdown_secs.to_string(),
    },
    Field {
        key: "workflow.step_timeout_secs",
        env_keys: &["INCIDENT_BOT_WORKFLOW_STEP_TIMEOUT_SECS"],
        value: |config| config.workflow.step_timeout_secs.to_string(),
    },
    Field {
        key: "workflow.thread_fetch_limit",
        env_keys: &["INCIDENT_BOT_WORKFLOW_THREAD_FETCH_LIMIT"],
        value: |config| config.workflow.thread_fetch_limit.to_string(),
    },
    Field {
        key: "workflow.teams_refresh_secs",
        env_keys: &["INCIDENT_BOT_WORKFLOW_TEAMS_REFRESH_SECS"],
        value: |config| config.workflow.teams_refresh_secs.to_string(),
    },
    Field {
        key: "workflow.display_timezone",
        env_keys: &["INCIDENT_BOT_WORKFLOW_DISPLAY_TIMEZONE"],
        value: |config| config.workflow.display_timezone.name().to_string(),
    },
    Field {
        key: "workflow.request_timeout_secs",
        env_keys: &["INCIDENT_BOT_WORKFLOW_REQUEST_TIMEOUT_SECS"],
        value: |config| config.workflow.request_timeout_secs.to_string(),
    },
    Field {
        key: "digest.enabled",
        env_keys: &["INCIDENT_BOT_DIGEST_ENABLED"],
        value: |config| config.digest.enabled.to_string(),
    },
    Field {
        key: "digest.hour",
        env_keys: &["INCIDENT_BOT_DIGEST_HOUR"],
        value: |config| config.digest.hour.to_string(),
    },
    Field {
        key: "digest.timezone",
        env_keys: &["INCIDENT_BOT_DIGEST_TIMEZONE"],
        value: |config| config.digest.timezone.name().to_string(),
    },
    Field {
        key: "logging.level",
        env_keys: &["INCIDENT_BOT_LOGGING_LEVEL", "INCIDENT_BOT_LOG_LEVEL"],
        value: |config| config.logging.level.clone(),
    },
    Field {
        key: "logging.format",
        env_keys: &["INCIDENT_BOT_LOGGING_FORMAT", "INCIDENT_BOT_LOG_FORMAT"],
        value: |config| format!("{:?}", config.logging.format),
    },
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, detect_config_path().as_deref())
}

fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(FIELDS.iter().map(|field| {
        let source = field_source(field, config_file_doc.as_ref(), config_file_path);
        render_line(field.key, &(field.value)(config), source)
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/incident-bot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

/// Keeps the vendor prefix (`xoxb`, `secret`, `ntn`) so operators can tell token kinds apart.
fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once(['-', '_']) {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &SecretString) -> String {
    let shown = if secret.expose_secret().trim().is_empty() { "<empty>" } else { "<redacted>" };
    shown.to_string()
}
