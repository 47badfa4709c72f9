//! Reads the replies of the thread an incident was reported from.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;
use incident_core::{ThreadMessage, ThreadMessagesResult};
use tracing::{info, warn};

use crate::client::{ChatPlatform, ReplyMessage};

pub const UNKNOWN_USER: &str = "Unknown User";

/// Fetches thread replies and resolves author names, remembering names for
/// the life of the process. Failed lookups are retried next time.
pub struct ThreadFetcher {
    chat: Arc<dyn ChatPlatform>,
    timezone: Tz,
    names: Mutex<HashMap<String, String>>,
}

impl ThreadFetcher {
    pub fn new(chat: Arc<dyn ChatPlatform>, timezone: Tz) -> Self {
        Self { chat, timezone, names: Mutex::new(HashMap::new()) }
    }

    /// `None` when Slack could not be read. A thread with only its root
    /// message yields an empty result.
    pub async fn fetch(&self, channel_id: &str, thread_ts: &str, limit: u32) -> Option<ThreadMessagesResult> {
        let replies = match self.chat.conversation_replies(channel_id, thread_ts, limit).await {
            Ok(replies) => replies,
            Err(error) => {
                warn!(event_name = "thread.fetch_failed", channel_id, thread_ts, error = %error, "thread context unavailable");
                return None;
            }
        };

        let has_more = replies.has_more;
        let replies: Vec<ReplyMessage> = replies.messages.into_iter().skip(1).collect();
        if replies.is_empty() {
            info!(event_name = "thread.no_replies", channel_id, thread_ts, "thread has only its root message");
            return Some(ThreadMessagesResult::default());
        }

        let names = self.author_names(&replies).await;
        let messages: Vec<ThreadMessage> = replies.iter().map(|reply| self.format(reply, &names)).collect();
        info!(
            event_name = "thread.fetched",
            channel_id,
            message_count = messages.len(),
            has_more,
            "thread context fetched"
        );
        Some(ThreadMessagesResult { total_count: messages.len(), messages, has_more })
    }

    /// One `users.info` per distinct uncached author, run concurrently.
    async fn author_names(&self, replies: &[ReplyMessage]) -> HashMap<String, String> {
        let mut names = HashMap::new();
        let mut missing: Vec<&str> = Vec::new();
        for user_id in replies.iter().filter_map(|reply| reply.user.as_deref()) {
            if names.contains_key(user_id) || missing.contains(&user_id) {
                continue;
            }
            match self.cached_name(user_id) {
                Some(name) => {
                    names.insert(user_id.to_string(), name);
                }
                None => missing.push(user_id),
            }
        }

        let resolved = join_all(missing.into_iter().map(|user_id| async move {
            (user_id, self.lookup_name(user_id).await)
        }))
        .await;
        for (user_id, name) in resolved {
            if let Some(name) = name {
                names.insert(user_id.to_string(), name);
            }
        }
        names
    }

    fn format(&self, reply: &ReplyMessage, names: &HashMap<String, String>) -> ThreadMessage {
        let user_name = reply
            .user
            .as_deref()
            .and_then(|user_id| names.get(user_id).cloned())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        let timestamp = reply.ts.clone().unwrap_or_default();
        ThreadMessage {
            user: reply.user.clone().unwrap_or_else(|| "unknown".to_string()),
            user_name,
            text: reply.text.clone().unwrap_or_default(),
            formatted_time: format_slack_time(&timestamp, self.timezone),
            timestamp,
        }
    }

    /// `None` on failure; failures are not memoized.
    async fn lookup_name(&self, user_id: &str) -> Option<String> {
        match self.chat.user_info(user_id).await {
            Ok(profile) => {
                let name = profile.preferred_name().unwrap_or(UNKNOWN_USER).to_string();
                self.names
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(user_id.to_string(), name.clone());
                Some(name)
            }
            Err(error) => {
                warn!(event_name = "thread.user_lookup_failed", user_id, error = %error, "author name unavailable");
                None
            }
        }
    }

    fn cached_name(&self, user_id: &str) -> Option<String> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).get(user_id).cloned()
    }
}

/// `h:mm AM/PM` in `timezone` for a Slack `ts` such as `1700000000.000100`.
pub fn format_slack_time(ts: &str, timezone: Tz) -> String {
    let Ok(seconds) = ts.parse::<f64>() else {
        return String::new();
    };
    let millis = (seconds * 1000.0).round() as i64;
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(instant) => instant.with_timezone(&timezone).format("%-I:%M %p").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono_tz::Tz;

    use super::{format_slack_time, ThreadFetcher};
    use crate::blocks::MessageTemplate;
    use crate::client::{
        AuthIdentity, ChatPlatform, ConversationReplies, PostedMessage, ReplyMessage, SlackApiError,
        UserProfile,
    };
    use crate::modal::ModalView;

    struct ThreadStub {
        replies: Result<ConversationReplies, SlackApiError>,
        profiles: HashMap<String, UserProfile>,
        lookups: AtomicUsize,
        lookup_delay: Duration,
    }

    fn reply(user: Option<&str>, text: &str, ts: &str) -> ReplyMessage {
        ReplyMessage { user: user.map(str::to_string), text: Some(text.to_string()), ts: Some(ts.to_string()) }
    }

    impl ThreadStub {
        fn new(messages: Vec<ReplyMessage>, has_more: bool) -> Self {
            let mut profiles = HashMap::new();
            profiles.insert(
                "U1".to_string(),
                UserProfile { id: "U1".to_string(), display_name: Some("ada".to_string()), ..UserProfile::default() },
            );
            profiles.insert(
                "U2".to_string(),
                UserProfile { id: "U2".to_string(), real_name: Some("Grace Hopper".to_string()), ..UserProfile::default() },
            );
            Self { replies: Ok(ConversationReplies { messages, has_more }), profiles, lookups: AtomicUsize::new(0), lookup_delay: Duration::ZERO }
        }
    }

    #[async_trait]
    impl ChatPlatform for ThreadStub {
        async fn open_view(&self, _: &str, _: &ModalView) -> Result<(), SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn post_message(&self, _: &str, _: Option<&str>, _: &MessageTemplate) -> Result<PostedMessage, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn post_ephemeral(&self, _: &str, _: &str, _: &str) -> Result<(), SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
        async fn user_info(&self, user_id: &str) -> Result<UserProfile, SlackApiError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.lookup_delay).await;
            self.profiles
                .get(user_id)
                .cloned()
                .ok_or_else(|| SlackApiError::Api { method: "users.info".to_string(), error: "user_not_found".to_string() })
        }
        async fn conversation_replies(&self, _: &str, _: &str, _: u32) -> Result<ConversationReplies, SlackApiError> {
            self.replies.clone()
        }
        async fn auth_test(&self) -> Result<AuthIdentity, SlackApiError> {
            Err(SlackApiError::Transport("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn root_is_dropped_and_names_resolved_in_order() {
        let stub = Arc::new(ThreadStub::new(
            vec![
                reply(Some("U1"), "root", "1700000000.000000"),
                reply(Some("U1"), "first", "1700000060.000100"),
                reply(Some("U2"), "second", "1700000120.000200"),
                reply(None, "third", "1700000180.000300"),
            ],
            true,
        ));
        let fetcher = ThreadFetcher::new(stub.clone(), Tz::UTC);

        let result = fetcher.fetch("C1", "1700000000.000000", 30).await.expect("fetched");

        let names: Vec<&str> = result.messages.iter().map(|message| message.user_name.as_str()).collect();
        assert_eq!(names, vec!["ada", "Grace Hopper", "Unknown User"]);
        assert_eq!(result.messages[0].text, "first");
        assert_eq!(result.messages[0].formatted_time, "10:14 PM");
        assert_eq!(result.messages[2].user, "unknown");
        assert_eq!(result.total_count, 3);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn names_are_memoized_but_failures_are_not() {
        let stub = Arc::new(ThreadStub::new(
            vec![
                reply(Some("U1"), "root", "1.0"),
                reply(Some("U1"), "a", "2.0"),
                reply(Some("U9"), "b", "3.0"),
            ],
            false,
        ));
        let fetcher = ThreadFetcher::new(stub.clone(), Tz::UTC);

        let first = fetcher.fetch("C1", "1.0", 30).await.expect("fetched");
        let lookups_after_first = stub.lookups.load(Ordering::SeqCst);
        fetcher.fetch("C1", "1.0", 30).await.expect("fetched");

        assert_eq!(first.messages[1].user_name, "Unknown User");
        assert_eq!(lookups_after_first, 2);
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 3, "only the failed lookup is retried");
    }

    #[tokio::test(start_paused = true)]
    async fn each_author_is_looked_up_once_per_fetch() {
        let mut messages = vec![reply(Some("U1"), "root", "1.0")];
        messages.extend((0..10).map(|n| reply(Some("U1"), "again", &format!("{}.0", n + 2))));
        messages.push(reply(Some("U2"), "late", "20.0"));
        let mut stub = ThreadStub::new(messages, false);
        stub.lookup_delay = Duration::from_millis(10);
        let stub = Arc::new(stub);
        let fetcher = ThreadFetcher::new(stub.clone(), Tz::UTC);

        let result = fetcher.fetch("C1", "1.0", 30).await.expect("fetched");

        assert_eq!(result.messages.len(), 11);
        assert!(result.messages[..10].iter().all(|message| message.user_name == "ada"));
        assert_eq!(result.messages[10].user_name, "Grace Hopper");
        assert_eq!(stub.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn root_only_thread_is_empty_and_errors_are_none() {
        let root_only = Arc::new(ThreadStub::new(vec![reply(Some("U1"), "root", "1.0")], false));
        let result = ThreadFetcher::new(root_only, Tz::UTC).fetch("C1", "1.0", 30).await.expect("fetched");
        assert!(result.messages.is_empty());
        assert_eq!(result.total_count, 0);
        assert!(!result.has_more);

        let mut failing = ThreadStub::new(Vec::new(), false);
        failing.replies = Err(SlackApiError::Api { method: "conversations.replies".to_string(), error: "channel_not_found".to_string() });
        assert_eq!(ThreadFetcher::new(Arc::new(failing), Tz::UTC).fetch("C1", "1.0", 30).await, None);
    }

    #[test]
    fn time_is_rendered_in_display_timezone() {
        assert_eq!(format_slack_time("1700000000.000100", Tz::UTC), "10:13 PM");
        assert_eq!(format_slack_time("1700000000.000100", Tz::Europe__Warsaw), "11:13 PM");
        assert_eq!(format_slack_time("1699999200", Tz::America__New_York), "5:00 PM");
        assert_eq!(format_slack_time("garbage", Tz::UTC), "");
    }
}
