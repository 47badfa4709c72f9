//! Background-refreshed snapshot of the active teams.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use incident_core::{Team, TeamDirectory, TeamsSnapshot};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::client::{DatabaseQuery, DocumentStore, NotionError, PageObject};

const TITLE_PROPERTIES: [&str; 3] = ["Team", "Name", "Title"];
const UNNAMED_TEAM: &str = "Unnamed Team";

#[async_trait]
pub trait TeamSource: Send + Sync {
    async fn fetch_active_teams(&self) -> Result<Vec<Team>, NotionError>;
}

pub struct NotionTeamSource {
    store: Arc<dyn DocumentStore>,
    database_id: Option<String>,
}

impl NotionTeamSource {
    pub fn new(store: Arc<dyn DocumentStore>, database_id: Option<String>) -> Self {
        Self { store, database_id: database_id.filter(|id| !id.trim().is_empty()) }
    }
}

fn team_from_page(page: &PageObject) -> Team {
    let name = TITLE_PROPERTIES
        .iter()
        .find_map(|property| page.title(property))
        .unwrap_or_else(|| UNNAMED_TEAM.to_string());
    Team { id: page.id.clone(), name }
}

#[async_trait]
impl TeamSource for NotionTeamSource {
    async fn fetch_active_teams(&self) -> Result<Vec<Team>, NotionError> {
        let Some(database_id) = &self.database_id else {
            return Ok(Vec::new());
        };

        let query = DatabaseQuery {
            filter: Some(json!({"property": "Active", "checkbox": {"equals": true}})),
            sorts: Vec::new(),
        };
        let pages = self.store.query_database(database_id, &query).await?;
        Ok(pages.iter().map(team_from_page).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub team_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub refresh_scheduled: bool,
}

/// Readers always see one whole snapshot; a refresh swaps it in a single send.
pub struct TeamsCache {
    source: Arc<dyn TeamSource>,
    snapshot: watch::Sender<Arc<TeamsSnapshot>>,
    refresh_interval: Duration,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl TeamsCache {
    pub fn new(source: Arc<dyn TeamSource>, refresh_interval: Duration) -> Arc<Self> {
        let (snapshot, _) = watch::channel(Arc::new(TeamsSnapshot::default()));
        Arc::new(Self { source, snapshot, refresh_interval, refresh_task: Mutex::new(None) })
    }

    /// Loads once, then refreshes on the interval until [`TeamsCache::stop`].
    /// Failures are logged and leave the cache empty rather than erroring.
    pub async fn initialize(self: &Arc<Self>) {
        if let Err(error) = self.refresh().await {
            warn!(event_name = "teams_cache.initial_load_failed", error = %error, "starting with an empty teams cache");
        }
        self.start_periodic_refresh();
    }

    /// Replaces the snapshot with a fresh fetch. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, NotionError> {
        let teams = self.source.fetch_active_teams().await?;
        let count = teams.len();
        self.snapshot.send_replace(Arc::new(TeamsSnapshot::new(teams, Utc::now())));
        info!(event_name = "teams_cache.refreshed", team_count = count, "teams cache refreshed");
        Ok(count)
    }

    pub fn read(&self) -> Arc<TeamsSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn team_names(&self, ids: &[String]) -> Vec<String> {
        self.read().team_names(ids)
    }

    pub fn cache_info(&self) -> CacheInfo {
        let snapshot = self.read();
        CacheInfo {
            team_count: snapshot.teams.len(),
            last_updated: snapshot.last_updated,
            refresh_scheduled: self.refresh_scheduled(),
        }
    }

    /// True while the periodic refresh task is alive, whether or not a fetch
    /// is in flight right now.
    pub fn refresh_scheduled(&self) -> bool {
        self.refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancels the periodic refresh. The current snapshot is kept.
    pub fn stop(&self) {
        let task = self.refresh_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            info!(event_name = "teams_cache.stopped", "teams cache refresh stopped");
        }
    }

    fn start_periodic_refresh(self: &Arc<Self>) {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(error) = cache.refresh().await {
                    warn!(event_name = "teams_cache.refresh_failed", error = %error, "keeping previous teams snapshot");
                }
            }
        });

        let previous =
            self.refresh_task.lock().unwrap_or_else(PoisonError::into_inner).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl TeamDirectory for TeamsCache {
    fn snapshot(&self) -> Arc<TeamsSnapshot> {
        self.read()
    }
}

impl Drop for TeamsCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use incident_core::{Team, TeamDirectory};
    use serde_json::json;
    use tokio::sync::{Mutex, Notify};

    use super::{team_from_page, TeamSource, TeamsCache};
    use crate::client::{NotionError, PageObject};

    fn team(id: &str, name: &str) -> Team {
        Team { id: id.to_string(), name: name.to_string() }
    }

    /// Hands out scripted fetch results in order, repeating the last one.
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<Vec<Team>, NotionError>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<Vec<Team>, NotionError>>) -> Self {
            Self { results: Mutex::new(results.into()), calls: AtomicUsize::new(0), gate: None }
        }
    }

    #[async_trait]
    impl TeamSource for ScriptedSource {
        async fn fetch_active_teams(&self) -> Result<Vec<Team>, NotionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut results = self.results.lock().await;
            if results.len() > 1 {
                results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
            } else {
                results.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
            }
        }
    }

    #[test]
    fn team_title_falls_back_through_known_properties() {
        let named: PageObject = serde_json::from_value(json!({
            "id": "t1",
            "properties": {"Name": {"title": [{"plain_text": "Payments"}]}}
        }))
        .expect("page json");
        let unnamed: PageObject = serde_json::from_value(json!({
            "id": "t2",
            "properties": {"Team": {"title": []}}
        }))
        .expect("page json");

        assert_eq!(team_from_page(&named), team("t1", "Payments"));
        assert_eq!(team_from_page(&unnamed), team("t2", "Unnamed Team"));
    }

    #[tokio::test]
    async fn cache_starts_empty_and_fills_on_initialize() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![team("t1", "Platform")])]));
        let cache = TeamsCache::new(source, Duration::from_secs(300));

        assert!(cache.read().is_empty());
        cache.initialize().await;

        assert_eq!(cache.read().teams, vec![team("t1", "Platform")]);
        assert!(cache.cache_info().last_updated.is_some());
        assert!(cache.refresh_scheduled());
        assert!(cache.cache_info().refresh_scheduled);
        cache.stop();
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![team("t1", "Platform")]),
            Err(NotionError::Transport("connection reset".to_string())),
        ]));
        let cache = TeamsCache::new(source, Duration::from_secs(300));

        cache.refresh().await.expect("first refresh");
        let before = cache.read();
        assert!(cache.refresh().await.is_err());

        assert_eq!(cache.read(), before);
    }

    #[tokio::test]
    async fn initialize_swallows_failures() {
        let source = Arc::new(ScriptedSource::new(vec![Err(NotionError::Transport("down".to_string()))]));
        let cache = TeamsCache::new(source, Duration::from_secs(300));

        cache.initialize().await;

        assert!(cache.read().is_empty());
        cache.stop();
    }

    #[tokio::test]
    async fn readers_see_old_set_until_refresh_completes() {
        let gate = Arc::new(Notify::new());
        let mut source = ScriptedSource::new(vec![
            Ok(vec![team("t1", "Platform"), team("t2", "Payments")]),
            Ok(vec![team("t3", "Growth")]),
        ]);
        source.gate = Some(gate.clone());
        let source = Arc::new(source);
        let cache = TeamsCache::new(source.clone(), Duration::from_secs(300));

        gate.notify_one();
        cache.refresh().await.expect("initial refresh");

        let refreshing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh().await })
        };
        while source.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.read().teams.len(), 2, "mid-refresh read returns the complete old set");

        gate.notify_one();
        refreshing.await.expect("task joined").expect("second refresh");
        assert_eq!(cache.read().teams, vec![team("t3", "Growth")]);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_runs_on_the_interval() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![team("t1", "Platform")])]));
        let cache = TeamsCache::new(source.clone(), Duration::from_secs(300));

        cache.initialize().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        cache.stop();
        cache.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.refresh_scheduled());
        assert!(!cache.cache_info().refresh_scheduled);
        assert_eq!(cache.team_names(&["t1".to_string()]), vec!["Platform".to_string()]);
    }

    #[tokio::test]
    async fn directory_trait_reads_the_live_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![team("t1", "Platform")])]));
        let cache = TeamsCache::new(source, Duration::from_secs(300));
        let directory: &dyn TeamDirectory = cache.as_ref();
        assert!(directory.team_names(&["t1".to_string()]).is_empty());

        cache.refresh().await.expect("refresh");

        let directory: &dyn TeamDirectory = cache.as_ref();
        assert_eq!(directory.team_names(&["t1".to_string(), "zz".to_string()]), vec!["Platform".to_string()]);
    }
}
