use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{DirectoryUser, DocumentStore, UserKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    NotFound,
    LookupFailed(String),
}

/// Picks the directory entry a display name refers to within one page of users.
pub trait NameMatcher: Send + Sync {
    fn best_match<'a>(
        &self,
        normalized_query: &str,
        candidates: &'a [DirectoryUser],
    ) -> Option<&'a DirectoryUser>;
}

/// First exact name match on the page, otherwise the first entry where either
/// name contains the other. There is no ranking, so common names can collide.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubstringNameMatcher;

impl NameMatcher for SubstringNameMatcher {
    fn best_match<'a>(
        &self,
        normalized_query: &str,
        candidates: &'a [DirectoryUser],
    ) -> Option<&'a DirectoryUser> {
        let named = move || {
            candidates.iter().filter_map(|user| {
                let name = normalize(user.name.as_deref()?);
                (!name.is_empty()).then_some((user, name))
            })
        };

        named().find(|(_, name)| name == normalized_query).or_else(|| {
            named().find(|(_, name)| {
                name.contains(normalized_query) || normalized_query.contains(name.as_str())
            })
        })
        .map(|(user, _)| user)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Maps a Slack identity onto a Notion workspace member.
pub struct IdentityResolver {
    store: Arc<dyn DocumentStore>,
    matcher: Box<dyn NameMatcher>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_matcher(store, Box::new(SubstringNameMatcher))
    }

    pub fn with_matcher(store: Arc<dyn DocumentStore>, matcher: Box<dyn NameMatcher>) -> Self {
        Self { store, matcher }
    }

    pub async fn resolve_by_email(&self, email: &str) -> LookupOutcome {
        let wanted = email.trim();
        if wanted.is_empty() {
            return LookupOutcome::NotFound;
        }

        self.scan("email", |people| {
            people
                .iter()
                .find(|user| {
                    user.email.as_deref().is_some_and(|candidate| candidate.eq_ignore_ascii_case(wanted))
                })
                .map(|user| user.id.clone())
        })
        .await
    }

    pub async fn resolve_by_name(&self, name: &str) -> LookupOutcome {
        let query = normalize(name);
        if query.is_empty() {
            return LookupOutcome::NotFound;
        }

        self.scan("name", |people| {
            self.matcher.best_match(&query, people).map(|user| user.id.clone())
        })
        .await
    }

    /// Email first; the name is only tried when the email gives no answer.
    pub async fn resolve(&self, email: Option<&str>, name: Option<&str>) -> LookupOutcome {
        let mut last = LookupOutcome::NotFound;

        if let Some(email) = email.filter(|value| !value.trim().is_empty()) {
            last = self.resolve_by_email(email).await;
            if matches!(last, LookupOutcome::Found(_)) {
                return last;
            }
        }

        if let Some(name) = name.filter(|value| !value.trim().is_empty()) {
            let by_name = self.resolve_by_name(name).await;
            if matches!(by_name, LookupOutcome::Found(_)) || matches!(last, LookupOutcome::NotFound) {
                last = by_name;
            }
        }

        last
    }

    async fn scan<F>(&self, strategy: &'static str, mut find: F) -> LookupOutcome
    where
        F: FnMut(&[DirectoryUser]) -> Option<String>,
    {
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.store.list_users(cursor.as_deref()).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(event_name = "identity.lookup_failed", strategy, error = %error, "notion user lookup failed");
                    return LookupOutcome::LookupFailed(error.to_string());
                }
            };

            let people: Vec<DirectoryUser> =
                page.results.into_iter().filter(|user| user.kind == UserKind::Person).collect();
            if let Some(id) = find(people.as_slice()) {
                debug!(event_name = "identity.resolved", strategy, notion_user_id = %id, "notion user resolved");
                return LookupOutcome::Found(id);
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => return LookupOutcome::NotFound,
            }
        }
    }
}
