//! Tracker client seam.
//!
//! The triage engine only ever sees these traits and the typed errors below;
//! everything tracker-protocol-specific (endpoint layout, auth scheme, wire
//! encoding) lives in [`rest`].

pub mod rest;

use crate::payload::TicketPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username/secret pair for the tracker session.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Manual Debug: the secret must not reach logs or error chains.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote-assigned identifier of a created ticket (e.g. "PLAT-24").
///
/// The current pass only logs it, but submitters must surface it for future
/// dedup against already-filed tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The session could not be established. Fatal to the whole pass: a broken
/// session would poison every subsequent submission.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid tracker endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("tracker rejected credentials for {username} (status {status})")]
    Auth { username: String, status: u16 },
    #[error("could not reach tracker: {0}")]
    Network(String),
}

/// One ticket could not be created. Recorded per item; the pass continues.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("tracker rejected the ticket (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected create-issue response: {0}")]
    MalformedResponse(String),
}

/// A tracker the engine can open one session against per pass.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Establish one authenticated session. No internal retry.
    async fn open(&self) -> Result<Box<dyn TrackerSession>, ConnectionError>;
}

/// An authenticated handle to the tracker, valid for one triage pass.
#[async_trait]
pub trait TrackerSession: Send + Sync {
    /// Create one ticket, waiting until the tracker acknowledges creation
    /// or reports failure.
    async fn submit(&self, ticket: &TicketPayload) -> Result<TicketId, SubmissionError>;

    /// Release the session. Idempotent; best-effort.
    async fn close(&self);
}
