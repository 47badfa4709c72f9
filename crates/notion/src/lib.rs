pub mod blocks;
pub mod client;
pub mod http;
pub mod page;
pub mod provenance;
pub mod queries;
pub mod teams;
pub mod users;

pub use client::{
    BlockSummary, CreatePageRequest, DatabaseInfo, DatabaseQuery, DirectoryUser, DocumentStore,
    NotionError, PageObject, UserKind, UserPage,
};
pub use http::NotionHttpClient;
pub use page::{build_incident_record, IncidentRecord};
pub use provenance::{backfill_slack_link, BackfillReport, SlackLink};
pub use queries::fetch_unassigned_incidents;
pub use teams::{CacheInfo, NotionTeamSource, TeamSource, TeamsCache};
pub use users::{IdentityResolver, LookupOutcome, NameMatcher, SubstringNameMatcher};
