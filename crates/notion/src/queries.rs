use chrono::NaiveDate;
use incident_core::{page_url, IncidentStatus, UnassignedIncident};
use serde_json::{json, Value};

use crate::client::{DatabaseQuery, DocumentStore, NotionError, PageObject};
use crate::page::property;

/// Unresolved incidents with nobody in `Owner`, oldest discovery first.
pub fn unassigned_incidents_query() -> DatabaseQuery {
    let statuses: Vec<Value> = IncidentStatus::UNRESOLVED
        .iter()
        .map(|status| json!({"property": property::STATUS, "status": {"equals": status.as_str()}}))
        .collect();

    DatabaseQuery {
        filter: Some(json!({
            "and": [
                {"property": property::OWNER, "people": {"is_empty": true}},
                {"or": statuses}
            ]
        })),
        sorts: vec![json!({"property": property::DISCOVER_DATE, "direction": "ascending"})],
    }
}

pub async fn fetch_unassigned_incidents(
    store: &dyn DocumentStore,
    database_id: &str,
) -> Result<Vec<UnassignedIncident>, NotionError> {
    let pages = store.query_database(database_id, &unassigned_incidents_query()).await?;
    Ok(pages.iter().map(unassigned_from_page).collect())
}

fn unassigned_from_page(page: &PageObject) -> UnassignedIncident {
    UnassignedIncident {
        id: page.id.clone(),
        url: page.url.clone().unwrap_or_else(|| page_url(&page.id)),
        title: page.title(property::TITLE).unwrap_or_else(|| "Untitled".to_string()),
        severity: page.select_name(property::SEVERITY),
        area: page.select_name(property::AREA),
        status: page.status_name(property::STATUS),
        discover_date: page.date_start(property::DISCOVER_DATE).and_then(|start| parse_day(&start)),
        team_ids: page.relation_ids(property::TEAMS),
    }
}

/// Accepts both plain dates and full timestamps.
fn parse_day(start: &str) -> Option<NaiveDate> {
    let day = start.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
