use std::sync::Arc;
use std::time::Duration;

use incident_core::config::{AppConfig, LoadOptions};
use incident_notion::{DocumentStore, NotionHttpClient};
use incident_slack::{ChatPlatform, SlackWebClient};
use serde::Serialize;

use super::block_on;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const REMOTE_CHECKS: [&str; 3] = ["slack_auth", "notion_incidents_database", "notion_teams_database"];

pub fn run(json_output: bool) -> super::CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    super::CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let mut checks = vec![DoctorCheck::pass("config_validation", "configuration loaded and validated")];
            match remote_checks(&config) {
                Ok(remote) => checks.extend(remote),
                Err(error) => checks.extend(REMOTE_CHECKS.map(|name| DoctorCheck::fail(name, error.clone()))),
            }
            checks
        }
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail("config_validation", error.to_string())];
            checks.extend(
                REMOTE_CHECKS
                    .map(|name| DoctorCheck::skipped(name, "skipped because configuration did not load")),
            );
            checks
        }
    };

    summarize(checks)
}

fn remote_checks(config: &AppConfig) -> Result<Vec<DoctorCheck>, String> {
    let timeout = Duration::from_secs(config.workflow.request_timeout_secs);
    let chat: Arc<dyn ChatPlatform> = Arc::new(
        SlackWebClient::new(&config.slack, timeout).map_err(|error| format!("slack client setup failed: {error}"))?,
    );
    let store: Arc<dyn DocumentStore> = Arc::new(
        NotionHttpClient::new(&config.notion, timeout)
            .map_err(|error| format!("notion client setup failed: {error}"))?,
    );

    block_on(collect_checks(config, chat.as_ref(), store.as_ref()))
}

async fn collect_checks(
    config: &AppConfig,
    chat: &dyn ChatPlatform,
    store: &dyn DocumentStore,
) -> Vec<DoctorCheck> {
    let slack = match chat.auth_test().await {
        Ok(identity) => DoctorCheck::pass(
            "slack_auth",
            format!(
                "authenticated as `{}` in workspace `{}`",
                identity.user.as_deref().unwrap_or("unknown"),
                identity.team.as_deref().unwrap_or("unknown")
            ),
        ),
        Err(error) => DoctorCheck::fail("slack_auth", format!("auth.test failed: {error}")),
    };

    let incidents = database_check(store, "notion_incidents_database", &config.notion.incidents_database_id).await;

    let teams = match config.notion.teams_database_id.as_deref() {
        Some(database_id) => database_check(store, "notion_teams_database", database_id).await,
        None => DoctorCheck::skipped(
            "notion_teams_database",
            "notion.teams_database_id is unset; team options will be empty",
        ),
    };

    vec![slack, incidents, teams]
}

async fn database_check(store: &dyn DocumentStore, name: &'static str, database_id: &str) -> DoctorCheck {
    match store.retrieve_database(database_id).await {
        Ok(database) => DoctorCheck::pass(name, format!("database `{}` ({}) is shared with the integration", database.title, database.id)),
        Err(error) => DoctorCheck::fail(name, format!("databases.retrieve `{database_id}` failed: {error}")),
    }
}

/// Skipped checks do not fail the report; only an explicit failure does.
fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
