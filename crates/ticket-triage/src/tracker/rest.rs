//! REST adapter for a JIRA-style tracker.
//!
//! Owns every protocol detail: resource layout, basic auth, the JSON
//! create-issue body, and response decoding. Nothing outside this module
//! constructs tracker wire artifacts.

use super::{ConnectionError, Credentials, SubmissionError, TicketId, Tracker, TrackerSession};
use crate::payload::TicketPayload;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Relative path of the create-issue resource below the tracker root.
const ISSUE_RESOURCE: &str = "rest/api/2/issue/";
/// Relative path of the credential probe used when opening a session.
const MYSELF_RESOURCE: &str = "rest/api/2/myself";
/// Per-request timeout. An expired submit surfaces as a per-item
/// `SubmissionError`; it never aborts the pass.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracker backed by a JIRA-compatible REST API.
#[derive(Debug)]
pub struct RestTracker {
    endpoint: Url,
    credentials: Credentials,
    issue_type_id: String,
}

impl RestTracker {
    /// `endpoint` must already carry a trailing slash (see
    /// [`crate::config::normalize_endpoint`]); it is parsed, not
    /// re-normalized, here.
    pub fn new(
        endpoint: &str,
        credentials: Credentials,
        issue_type_id: &str,
    ) -> Result<Self, ConnectionError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ConnectionError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            credentials,
            issue_type_id: issue_type_id.to_string(),
        })
    }

    fn resource(&self, path: &str) -> Result<Url, ConnectionError> {
        self.endpoint
            .join(path)
            .map_err(|e| ConnectionError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Tracker for RestTracker {
    async fn open(&self) -> Result<Box<dyn TrackerSession>, ConnectionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectionError::Network(e.to_string()))?;

        // Basic auth has no login handshake, so probe the credentials once
        // up-front: a broken session must fail the pass before any ticket
        // is attempted.
        let probe = self.resource(MYSELF_RESOURCE)?;
        debug!(url = %probe, user = %self.credentials.username, "Probing tracker session");
        let response = client
            .get(probe)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| ConnectionError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectionError::Auth {
                username: self.credentials.username.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ConnectionError::Network(format!(
                "session probe returned status {status}"
            )));
        }

        let create_url = self.resource(ISSUE_RESOURCE)?;
        info!(endpoint = %self.endpoint, "Tracker session established");
        Ok(Box::new(RestSession {
            client,
            create_url,
            credentials: self.credentials.clone(),
            issue_type_id: self.issue_type_id.clone(),
        }))
    }
}

/// One authenticated REST session.
pub struct RestSession {
    client: reqwest::Client,
    create_url: Url,
    credentials: Credentials,
    issue_type_id: String,
}

/// JIRA v2 create-issue request body.
#[derive(Debug, Serialize)]
struct CreateIssueRequest {
    fields: IssueFields,
}

#[derive(Debug, Serialize)]
struct IssueFields {
    project: ProjectRef,
    summary: String,
    description: String,
    issuetype: IssueTypeRef,
}

#[derive(Debug, Serialize)]
struct ProjectRef {
    key: String,
}

#[derive(Debug, Serialize)]
struct IssueTypeRef {
    id: String,
}

/// The subset of the create-issue response the pass cares about.
#[derive(Debug, Deserialize)]
struct CreateIssueResponse {
    key: String,
}

impl CreateIssueRequest {
    fn from_payload(payload: &TicketPayload, issue_type_id: &str) -> Self {
        Self {
            fields: IssueFields {
                project: ProjectRef {
                    key: payload.project_key.clone(),
                },
                summary: payload.summary.clone(),
                description: payload.description.clone(),
                issuetype: IssueTypeRef {
                    id: issue_type_id.to_string(),
                },
            },
        }
    }
}

#[async_trait]
impl TrackerSession for RestSession {
    async fn submit(&self, ticket: &TicketPayload) -> Result<TicketId, SubmissionError> {
        let body = CreateIssueRequest::from_payload(ticket, &self.issue_type_id);
        let response = self
            .client
            .post(self.create_url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateIssueResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;
        debug!(key = %created.key, "Tracker acknowledged issue");
        Ok(TicketId(created.key))
    }

    async fn close(&self) {
        // Stateless HTTP session; nothing to tear down on the wire.
        debug!("Tracker session released");
    }
}
