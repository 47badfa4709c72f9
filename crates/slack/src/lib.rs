//! Slack side of the incident bot.
//!
//! - **Web API** (`client`, `web`) - `ChatPlatform` trait and its reqwest implementation
//! - **Inbound requests** (`signature`, `payloads`, `events`) - verify, decode and dispatch
//! - **Intake** (`commands`, `modal`) - `/incident` and "Report as incident" open the modal
//! - **Block Kit** (`blocks`) - confirmation, digest and error messages
//! - **Threads** (`threads`) - reply fetching with memoized author names
//!
//! ```text
//! HTTP request → SignatureVerifier → payloads::parse_* → EventDispatcher → Handlers
//!                                                              ↓
//!                                                   Ack (oneshot) → HTTP response
//! ```

pub mod blocks;
pub mod client;
pub mod commands;
pub mod events;
pub mod modal;
pub mod payloads;
pub mod signature;
pub mod threads;
pub mod web;

pub use blocks::{MessageBuilder, MessageTemplate};
pub use client::{ChatPlatform, PostedMessage, SlackApiError, UserProfile};
pub use commands::{IncidentCommandHandler, ModalLauncher, ReportMessageHandler};
pub use events::{
    Ack, AckResponse, DispatchError, EventContext, EventDispatcher, EventHandler,
    EventHandlerError, HandlerResult, SlackEvent, SubmissionService, UrlVerificationHandler,
    ViewSubmissionHandler,
};
pub use payloads::{PayloadError, ViewSubmissionPayload};
pub use signature::{SignatureError, SignatureVerifier};
pub use threads::ThreadFetcher;
pub use web::SlackWebClient;
