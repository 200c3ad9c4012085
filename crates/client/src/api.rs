//! HTTP surface of the tutor service.
//!
//! Every call takes the credential to use explicitly; callers fetch it from
//! their [`crate::credential::CredentialProvider`] right before the request.

use crate::{credential::Credential, error::ClientError};
use chrono::Utc;
use reqwest::{Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, instrument};
use tutor_core::{
    assessment::{AssessmentAnswer, AssessmentFeedback},
    event::{EventKind, MetricsPatch, TutorEvent, parse_timestamp},
    phase::Phase,
    session::{Message, Role},
};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for creating a new tutoring session.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateSessionRequest {
    #[serde(rename = "selection_board")]
    pub board: String,
    #[serde(rename = "selection_subject")]
    pub subject: String,
    #[serde(rename = "selection_chapter")]
    pub chapter: String,
    #[serde(rename = "selection_topic", skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

/// A point-in-time snapshot of the server's view of a session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionStatus {
    pub session_id: String,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub student_level: Option<String>,
    #[serde(default)]
    pub assessment_score: Option<f64>,
    #[serde(default)]
    pub concepts_covered: Vec<String>,
    #[serde(default)]
    pub current_topic: Option<Value>,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub is_paused: bool,
}

impl SessionStatus {
    /// Expresses the snapshot as events, so that resynchronising goes through
    /// the same reducer as the live stream.
    pub fn into_events(self) -> Vec<TutorEvent> {
        let timestamp = Utc::now();
        let mut events = Vec::with_capacity(2);

        if let Some(state) = self.current_state.as_deref() {
            events.push(TutorEvent {
                kind: EventKind::StateChange,
                content: String::new(),
                state: Some(Phase::parse(state)),
                timestamp,
                data: Map::new(),
            });
        }

        let mut data = Map::new();
        if let Some(level) = self.student_level {
            data.insert("student_level".into(), Value::String(level));
        }
        if let Some(score) = self.assessment_score {
            data.insert("assessment_score".into(), json!(score));
        }
        data.insert("concepts_covered".into(), json!(self.concepts_covered));
        if let Some(topic) = self.current_topic {
            data.insert("current_topic".into(), topic);
        }
        if let Some(progress) = self.progress {
            data.insert("progress".into(), progress);
        }
        data.insert("is_paused".into(), Value::Bool(self.is_paused));

        events.push(TutorEvent {
            kind: EventKind::MetricsUpdate(MetricsPatch::from_data(&data)),
            content: String::new(),
            state: None,
            timestamp,
            data,
        });
        events
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
}

impl From<HistoryEntry> for Message {
    fn from(entry: HistoryEntry) -> Self {
        let role = match entry.role.as_str() {
            "user" | "student" => Role::User,
            "system" => Role::System,
            _ => Role::Assistant,
        };
        Message {
            role,
            content: entry.content,
            timestamp: entry
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            state: entry.state.as_deref().map(Phase::parse),
            agent_id: entry.agent_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EndResponse {
    #[serde(default)]
    summary: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct TutorApi {
    http: reqwest::Client,
    base_url: String,
}

impl TutorApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/tutor-session/{}", self.base_url, path)
    }

    /// Opens the long-lived event stream. The token travels in the query
    /// because browser-style event-source clients cannot set headers.
    #[instrument(skip(self, credential))]
    pub async fn open_stream(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<Response, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("{session_id}/stream")))
            .query(&[("token", credential.expose())])
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        check(response).await
    }

    /// Sends one student message. The response body is an event stream.
    #[instrument(skip(self, message, credential))]
    pub async fn respond(
        &self,
        session_id: &str,
        message: &str,
        credential: &Credential,
    ) -> Result<Response, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("{session_id}/respond")))
            .bearer_auth(credential.expose())
            .header(header::ACCEPT, "text/event-stream")
            .json(&json!({ "message": message }))
            .send()
            .await?;
        check(response).await
    }

    #[instrument(skip(self, credential))]
    pub async fn pause(&self, session_id: &str, credential: &Credential) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("{session_id}/pause")))
            .bearer_auth(credential.expose())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Ends the session server-side and returns its summary, if one is sent.
    #[instrument(skip(self, credential))]
    pub async fn end(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<Option<Value>, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("{session_id}/end")))
            .bearer_auth(credential.expose())
            .send()
            .await?;
        let body: EndResponse = decode(check(response).await?).await?;
        Ok(body.summary)
    }

    #[instrument(skip(self, request, credential), fields(subject = %request.subject))]
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
        credential: &Credential,
    ) -> Result<Uuid, ClientError> {
        let response = self
            .http
            .post(self.url("create"))
            .bearer_auth(credential.expose())
            .json(request)
            .send()
            .await?;
        let body: CreateSessionResponse = decode(check(response).await?).await?;
        debug!(session_id = %body.session_id, "Session created");
        Ok(body.session_id)
    }

    #[instrument(skip(self, credential))]
    pub async fn status(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<SessionStatus, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("{session_id}/status")))
            .bearer_auth(credential.expose())
            .send()
            .await?;
        decode(check(response).await?).await
    }

    #[instrument(skip(self, credential))]
    pub async fn history(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("{session_id}/history")))
            .bearer_auth(credential.expose())
            .send()
            .await?;
        let body: HistoryResponse = decode(check(response).await?).await?;
        Ok(body.history.into_iter().map(Message::from).collect())
    }

    #[instrument(skip(self, answer, credential), fields(question_index = answer.index))]
    pub async fn assessment_feedback(
        &self,
        session_id: &str,
        answer: &AssessmentAnswer,
        credential: &Credential,
    ) -> Result<AssessmentFeedback, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("{session_id}/assessment/feedback")))
            .bearer_auth(credential.expose())
            .json(answer)
            .send()
            .await?;
        decode(check(response).await?).await
    }
}

/// Maps non-success statuses to errors; 401/403 become `Unauthorized`.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized(status));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Http { status, body });
    }
    Ok(response)
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
