use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

/// One complete, immutable view of the Teams database.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeamsSnapshot {
    pub teams: Vec<Team>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TeamsSnapshot {
    pub fn new(teams: Vec<Team>, last_updated: DateTime<Utc>) -> Self {
        Self { teams, last_updated: Some(last_updated) }
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Names for `ids` in the order given. Unknown ids are dropped.
    pub fn team_names(&self, ids: &[String]) -> Vec<String> {
        let by_id: HashMap<&str, &str> =
            self.teams.iter().map(|team| (team.id.as_str(), team.name.as_str())).collect();
        ids.iter().filter_map(|id| by_id.get(id.as_str()).map(|name| (*name).to_string())).collect()
    }
}

/// Read side of the teams cache handed to request handlers.
pub trait TeamDirectory: Send + Sync {
    fn snapshot(&self) -> Arc<TeamsSnapshot>;

    fn team_names(&self, ids: &[String]) -> Vec<String> {
        self.snapshot().team_names(ids)
    }
}

/// Fixed directory for tests and one-shot CLI runs.
#[derive(Clone, Debug, Default)]
pub struct StaticTeamDirectory {
    snapshot: Arc<TeamsSnapshot>,
}

impl StaticTeamDirectory {
    pub fn new(teams: Vec<Team>) -> Self {
        Self { snapshot: Arc::new(TeamsSnapshot::new(teams, Utc::now())) }
    }
}

impl TeamDirectory for StaticTeamDirectory {
    fn snapshot(&self) -> Arc<TeamsSnapshot> {
        Arc::clone(&self.snapshot)
    }
}
