//! Turns a submitted incident modal into a Notion record and the Slack
//! messages that point at it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use incident_core::config::AppConfig;
use incident_core::flows::{
    FlowEngine, FlowTransitionError, IncidentSubmissionFlow, SubmissionEvent, SubmissionState,
};
use incident_core::{
    ApplicationError, CreatedIncident, Destination, IncidentFormData, SourceMetadata,
    TeamDirectory, ThreadMessagesResult, TriggerKind,
};
use incident_notion::provenance::slack_message_url;
use incident_notion::{
    backfill_slack_link, build_incident_record, DocumentStore, IdentityResolver, LookupOutcome,
    SlackLink,
};
use incident_slack::blocks::{
    confirmation_message, digest_notification_message, submission_ack_text, MessageBuilder,
};
use incident_slack::{
    Ack, AckResponse, ChatPlatform, EventContext, EventHandlerError, SubmissionService,
    ThreadFetcher, ViewSubmissionPayload,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::saga::{Saga, SagaReport, StepStatus, SubmissionStep};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionSettings {
    pub incidents_database_id: String,
    pub digest_channel_id: Option<String>,
    pub workspace_domain: Option<String>,
    pub step_timeout: Duration,
    pub thread_fetch_limit: u32,
}

impl SubmissionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            incidents_database_id: config.notion.incidents_database_id.clone(),
            digest_channel_id: config.digest_channel().map(str::to_string),
            workspace_domain: config.slack.workspace_domain.clone(),
            step_timeout: Duration::from_secs(config.workflow.step_timeout_secs),
            thread_fetch_limit: config.workflow.thread_fetch_limit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub state: SubmissionState,
    pub incident: Option<CreatedIncident>,
    pub report: SagaReport,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

/// Who filed the incident, as far as Slack and Notion could tell.
struct Reporter {
    name: String,
    notion_id: Option<String>,
}

/// Tracks the submission state machine alongside the saga. The saga picks
/// the steps; the flow only rejects an out-of-order event.
struct Progress<'a> {
    flow: &'a FlowEngine<IncidentSubmissionFlow>,
    state: SubmissionState,
}

impl Progress<'_> {
    fn advance(&mut self, event: SubmissionEvent) -> Result<(), FlowTransitionError> {
        self.state = self.flow.apply(self.state, event)?.to;
        Ok(())
    }
}

pub struct SubmissionOrchestrator {
    chat: Arc<dyn ChatPlatform>,
    store: Arc<dyn DocumentStore>,
    identity: IdentityResolver,
    threads: Arc<ThreadFetcher>,
    teams: Arc<dyn TeamDirectory>,
    settings: SubmissionSettings,
    flow: FlowEngine<IncidentSubmissionFlow>,
}

impl SubmissionOrchestrator {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        store: Arc<dyn DocumentStore>,
        threads: Arc<ThreadFetcher>,
        teams: Arc<dyn TeamDirectory>,
        settings: SubmissionSettings,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(Arc::clone(&store)),
            chat,
            store,
            threads,
            teams,
            settings,
            flow: FlowEngine::default(),
        }
    }

    /// Acks before any I/O, then runs the saga. Only a broken state machine
    /// is an error; a failed create is reported through the outcome.
    pub async fn handle(
        &self,
        submission: ViewSubmissionPayload,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mut saga = Saga::new(ctx.correlation_id.clone(), self.settings.step_timeout);
        let metadata = submission.metadata();
        let mut progress = Progress { flow: &self.flow, state: self.flow.initial_state() };

        let form = match submission.form_input().validate() {
            Ok(form) => form,
            Err(errors) => {
                ack.send(AckResponse::validation_errors(&errors));
                info!(
                    event_name = "submission.rejected",
                    correlation_id = %ctx.correlation_id,
                    user_id = %submission.user_id,
                    error_count = errors.errors.len(),
                    "incident form returned with validation errors"
                );
                saga.record(SubmissionStep::Validate, StepStatus::Failed { reason: errors.to_string() });
                saga.reject();
                progress.advance(SubmissionEvent::ValidationFailed)?;
                return Ok(SubmissionOutcome { state: progress.state, incident: None, report: saga.finish() });
            }
        };
        saga.record(SubmissionStep::Validate, StepStatus::Succeeded);
        ack.send(AckResponse::Empty);
        saga.record(SubmissionStep::Acknowledge, StepStatus::Succeeded);
        progress.advance(SubmissionEvent::AckSent)?;

        let trigger = if metadata.is_some() { TriggerKind::MessageAction } else { TriggerKind::SlashCommand };
        let destination = Destination::resolve(metadata.as_ref(), &submission.user_id);
        info!(
            event_name = "submission.accepted",
            correlation_id = %ctx.correlation_id,
            user_id = %submission.user_id,
            trigger = trigger.label(),
            destination = destination.channel_id(),
            "processing incident submission"
        );

        let reporter = self.resolve_reporter(&mut saga, &submission).await;
        progress.advance(SubmissionEvent::IdentityStepFinished)?;

        let thread = self.fetch_thread(&mut saga, metadata.as_ref()).await;
        progress.advance(SubmissionEvent::ContextStepFinished)?;

        let mut form = IncidentFormData::new(
            form,
            submission.user_id.clone(),
            reporter.name,
            destination.channel_id(),
            trigger,
        );
        form.reporter_notion_id = reporter.notion_id;

        let record = build_incident_record(&form, thread.as_ref(), Utc::now());
        let request = record.create_request(&self.settings.incidents_database_id);

        let incident = match saga.run(SubmissionStep::CreateRecord, self.store.create_page(&request)).await {
            Ok(page_id) => CreatedIncident::new(page_id),
            Err(failure) => {
                progress.advance(SubmissionEvent::RecordCreationFailed)?;
                let text = ApplicationError::from(failure).into_interface(ctx.correlation_id.clone()).submission_failure_text();
                let notice = MessageBuilder::new(text).build();
                saga.attempt(
                    SubmissionStep::NotifyFailure,
                    self.chat.post_message(&submission.user_id, None, &notice),
                )
                .await;
                return Ok(SubmissionOutcome { state: progress.state, incident: None, report: saga.finish() });
            }
        };
        progress.advance(SubmissionEvent::RecordCreated)?;
        info!(
            event_name = "submission.record_created",
            correlation_id = %ctx.correlation_id,
            incident_id = %incident.id,
            "incident record created"
        );

        match &record.thread_context {
            Some(blocks) => {
                saga.attempt(
                    SubmissionStep::AppendThreadContext,
                    self.store.append_block_children(&incident.id, blocks),
                )
                .await;
            }
            None => saga.skip(SubmissionStep::AppendThreadContext, "no thread replies to append"),
        }

        let confirmation = confirmation_message(&form, &incident);
        let posted = saga
            .attempt(
                SubmissionStep::PublishConfirmation,
                self.chat.post_message(destination.channel_id(), destination.thread_ts(), &confirmation),
            )
            .await;

        if destination.is_channel_thread() {
            saga.attempt(
                SubmissionStep::PostEphemeralAck,
                self.chat.post_ephemeral(destination.channel_id(), &submission.user_id, &submission_ack_text(&incident)),
            )
            .await;
        } else {
            saga.skip(SubmissionStep::PostEphemeralAck, "confirmation went to a direct message");
        }

        match posted {
            Some(posted) => {
                progress.advance(SubmissionEvent::ConfirmationPublished)?;
                let link = SlackLink::new(&posted.channel, &posted.ts, self.settings.workspace_domain.as_deref());
                let backfill = saga
                    .attempt(
                        SubmissionStep::BackfillLink,
                        backfill_slack_link(self.store.as_ref(), &incident.id, &link, Utc::now()),
                    )
                    .await;
                if let Some(report) = backfill {
                    if !report.placeholder_rewritten {
                        saga.degrade(SubmissionStep::BackfillLink, "slack thread placeholder was not rewritten");
                    }
                    progress.advance(SubmissionEvent::LinkBackfilled)?;
                }
            }
            None => saga.skip(SubmissionStep::BackfillLink, "no confirmation message to link"),
        }

        self.notify_digest_channel(&mut saga, &form, &incident, metadata.as_ref()).await;

        let report = saga.finish();
        info!(
            event_name = "submission.finished",
            correlation_id = %ctx.correlation_id,
            incident_id = %incident.id,
            state = ?progress.state,
            outcome = ?report.outcome,
            "incident submission finished"
        );
        Ok(SubmissionOutcome { state: progress.state, incident: Some(incident), report })
    }

    /// Slack profile first, then the Notion user behind it. Neither is fatal.
    async fn resolve_reporter(&self, saga: &mut Saga, submission: &ViewSubmissionPayload) -> Reporter {
        let lookup = saga
            .attempt(SubmissionStep::ResolveIdentity, async {
                let profile = self.chat.user_info(&submission.user_id).await?;
                let outcome = self.identity.resolve(profile.email.as_deref(), profile.preferred_name()).await;
                Ok::<_, ApplicationError>((profile, outcome))
            })
            .await;

        let Some((profile, outcome)) = lookup else {
            return Reporter { name: submission.user_name.clone(), notion_id: None };
        };
        let name = profile.preferred_name().map_or_else(|| submission.user_name.clone(), str::to_string);

        match outcome {
            LookupOutcome::Found(notion_id) => Reporter { name, notion_id: Some(notion_id) },
            LookupOutcome::NotFound => {
                warn!(
                    event_name = "submission.reporter_unresolved",
                    correlation_id = %saga.correlation_id(),
                    user_id = %submission.user_id,
                    "no Notion user matches the submitter; reporter left empty"
                );
                saga.degrade(SubmissionStep::ResolveIdentity, "no matching Notion user");
                Reporter { name, notion_id: None }
            }
            LookupOutcome::LookupFailed(reason) => {
                saga.degrade(SubmissionStep::ResolveIdentity, format!("Notion user lookup failed: {reason}"));
                Reporter { name, notion_id: None }
            }
        }
    }

    async fn fetch_thread(&self, saga: &mut Saga, metadata: Option<&SourceMetadata>) -> Option<ThreadMessagesResult> {
        let Some((channel_id, thread_ts)) = metadata.and_then(SourceMetadata::thread_reference) else {
            saga.skip(SubmissionStep::FetchThreadContext, "submitted without a source thread");
            return None;
        };
        saga.attempt(SubmissionStep::FetchThreadContext, async {
            self.threads
                .fetch(channel_id, thread_ts, self.settings.thread_fetch_limit)
                .await
                .ok_or_else(|| ApplicationError::ChatPlatform("thread replies unavailable".to_string()))
        })
        .await
    }

    async fn notify_digest_channel(
        &self,
        saga: &mut Saga,
        form: &IncidentFormData,
        incident: &CreatedIncident,
        metadata: Option<&SourceMetadata>,
    ) {
        let Some(channel_id) = self.settings.digest_channel_id.as_deref() else {
            saga.skip(SubmissionStep::NotifyDigestChannel, "no digest channel configured");
            return;
        };
        let team_names = self.teams.team_names(&form.team_ids);
        let thread_url = metadata
            .and_then(SourceMetadata::thread_reference)
            .map(|(channel, ts)| slack_message_url(channel, ts, self.settings.workspace_domain.as_deref()));
        let message = digest_notification_message(form, incident, &team_names, thread_url.as_deref());
        saga.attempt(SubmissionStep::NotifyDigestChannel, self.chat.post_message(channel_id, None, &message)).await;
    }
}

#[async_trait]
impl SubmissionService for SubmissionOrchestrator {
    async fn submit(
        &self,
        submission: ViewSubmissionPayload,
        ack: Ack,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        self.handle(submission, ack, ctx)
            .await
            .map(|_| ())
            .map_err(|error| EventHandlerError::Submission(error.to_string()))
    }
}
