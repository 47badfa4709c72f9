//! Weekday digest of open incidents nobody owns yet.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use incident_core::{TeamDirectory, UnassignedIncident};
use incident_notion::{fetch_unassigned_incidents, DocumentStore, NotionError};
use incident_slack::blocks::{daily_digest_message, DigestItem};
use incident_slack::{ChatPlatform, MessageTemplate, SlackApiError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("could not query unassigned incidents: {0}")]
    Query(#[from] NotionError),
    #[error("could not post the digest: {0}")]
    Post(#[from] SlackApiError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DigestRun {
    Posted { incident_count: usize, ts: String },
    NothingToReport,
}

pub struct DailyDigest {
    chat: Arc<dyn ChatPlatform>,
    store: Arc<dyn DocumentStore>,
    teams: Arc<dyn TeamDirectory>,
    incidents_database_id: String,
    channel_id: String,
    timezone: Tz,
}

impl DailyDigest {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        store: Arc<dyn DocumentStore>,
        teams: Arc<dyn TeamDirectory>,
        incidents_database_id: impl Into<String>,
        channel_id: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            chat,
            store,
            teams,
            incidents_database_id: incidents_database_id.into(),
            channel_id: channel_id.into(),
            timezone,
        }
    }

    /// Builds the message without posting it. `None` when every incident has an owner.
    pub async fn preview(&self, now: DateTime<Utc>) -> Result<Option<(usize, MessageTemplate)>, DigestError> {
        let incidents = fetch_unassigned_incidents(self.store.as_ref(), &self.incidents_database_id).await?;
        if incidents.is_empty() {
            return Ok(None);
        }

        let today = now.with_timezone(&self.timezone).date_naive();
        let items = digest_items(incidents, today, self.teams.as_ref());
        Ok(Some((items.len(), daily_digest_message(today, &items))))
    }

    /// Queries and posts once. Nothing is posted when every incident has an owner.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DigestRun, DigestError> {
        let Some((incident_count, message)) = self.preview(now).await? else {
            info!(event_name = "digest.nothing_to_report", "no unassigned incidents");
            return Ok(DigestRun::NothingToReport);
        };
        let posted = self.chat.post_message(&self.channel_id, None, &message).await?;

        info!(
            event_name = "digest.posted",
            channel_id = %self.channel_id,
            incident_count,
            "daily digest posted"
        );
        Ok(DigestRun::Posted { incident_count, ts: posted.ts })
    }

    /// Runs at `hour` local time on weekdays until `shutdown` flips to true.
    pub fn spawn_schedule(self: Arc<Self>, hour: u32, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_run_after(now, hour, self.timezone);
                let wait = (next - now).to_std().unwrap_or_default();
                info!(event_name = "digest.scheduled", next_run = %next, "next daily digest scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(event_name = "digest.stopped", "daily digest schedule stopped");
                            return;
                        }
                        continue;
                    }
                }

                if let Err(failure) = self.run_once(Utc::now()).await {
                    error!(event_name = "digest.failed", error = %failure, "daily digest failed");
                }
            }
        })
    }
}

pub fn digest_items(
    incidents: Vec<UnassignedIncident>,
    today: NaiveDate,
    teams: &dyn TeamDirectory,
) -> Vec<DigestItem> {
    incidents
        .into_iter()
        .map(|incident| DigestItem {
            team_names: teams.team_names(&incident.team_ids),
            days_open: incident.discover_date.map_or(0, |discovered| (today - discovered).num_days()),
            incident,
        })
        .collect()
}

/// First weekday `hour:00` in `timezone` strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32, timezone: Tz) -> DateTime<Utc> {
    let local_today = now.with_timezone(&timezone).date_naive();
    for offset in 0..8 {
        let day = local_today + Duration::days(offset);
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let Some(candidate) = local_run_time(day, hour, timezone) else {
            continue;
        };
        if candidate > now {
            return candidate;
        }
    }
    now + Duration::days(1)
}

fn local_run_time(day: NaiveDate, hour: u32, timezone: Tz) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(hour, 0, 0)?;
    // A run hour inside a DST gap moves to the next valid hour.
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| timezone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}
