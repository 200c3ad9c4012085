//! The session orchestrator.
//!
//! [`TutorSession`] owns everything for one live session: the model (state,
//! overlay, assessment gate), the reconnecting primary stream, and the
//! command dispatcher. It is driven from a single task. Commands take
//! `&mut self`, so the primary stream is never polled while a command's
//! response is being folded in, and each response lands as one contiguous
//! block in the reducer's order.

use crate::{
    api::TutorApi,
    credential::CredentialProvider,
    dispatcher::{CommandDispatcher, FeedbackSource},
    error::ClientError,
    reconnect::{ConnectionState, ReconnectPolicy, ReconnectionController},
    stream::StreamConnector,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use tutor_core::{
    assessment::{AnswerOutcome, AssessmentError, AssessmentStage},
    model::{SessionModel, Update},
    overlay::HealthThresholds,
    session::Message,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub reconnect: ReconnectPolicy,
    pub health: HealthThresholds,
    /// Fetch per-answer feedback while the assessment gate is open.
    pub assessment_feedback: bool,
    /// Seed the transcript from the server when joining.
    pub load_history: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            health: HealthThresholds::default(),
            assessment_feedback: false,
            load_history: true,
        }
    }
}

/// Where the assessment stands after an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentProgress {
    Next,
    /// The combined answers were sent; these are the response updates.
    Submitted(Vec<Update>),
}

/// What is left of a session after [`TutorSession::end`].
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub session_id: String,
    pub summary: Option<Value>,
    pub transcript: Vec<Message>,
}

pub struct TutorSession {
    session_id: String,
    model: SessionModel,
    controller: ReconnectionController,
    dispatcher: Arc<CommandDispatcher>,
    feedback: Option<Arc<dyn FeedbackSource>>,
    load_history: bool,
    question_shown_at: Option<Instant>,
}

impl TutorSession {
    pub fn new(
        session_id: impl Into<String>,
        api: TutorApi,
        credentials: Arc<dyn CredentialProvider>,
        options: SessionOptions,
    ) -> Self {
        let connector = Arc::new(api.clone());
        Self::with_connector(session_id, api, connector, credentials, options)
    }

    /// Like [`Self::new`] with a custom primary-stream connector.
    pub fn with_connector(
        session_id: impl Into<String>,
        api: TutorApi,
        connector: Arc<dyn StreamConnector>,
        credentials: Arc<dyn CredentialProvider>,
        options: SessionOptions,
    ) -> Self {
        let session_id = session_id.into();
        let dispatcher = Arc::new(CommandDispatcher::new(
            api,
            credentials.clone(),
            session_id.clone(),
        ));
        let feedback = options
            .assessment_feedback
            .then(|| dispatcher.clone() as Arc<dyn FeedbackSource>);
        Self {
            controller: ReconnectionController::new(
                session_id.clone(),
                connector,
                credentials,
                options.reconnect,
            ),
            model: SessionModel::new(options.health),
            dispatcher,
            feedback,
            load_history: options.load_history,
            question_shown_at: None,
            session_id,
        }
    }

    pub fn with_feedback(mut self, source: Arc<dyn FeedbackSource>) -> Self {
        self.feedback = Some(source);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Read-only view for presentation.
    pub fn model(&self) -> &SessionModel {
        &self.model
    }

    pub fn connection(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.controller.attempts()
    }

    /// Whether the primary stream can still deliver events.
    pub fn is_streaming(&self) -> bool {
        self.controller.is_live()
    }

    /// Seeds the transcript (when enabled) and opens the primary stream.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn join(&mut self) -> Result<(), ClientError> {
        if self.load_history {
            match self.dispatcher.history().await {
                Ok(history) => {
                    info!(messages = history.len(), "Loaded session history");
                    self.model.seed_history(history);
                }
                Err(e) => warn!(error = %e, "Could not load session history"),
            }
        }
        self.controller.connect().await
    }

    /// Waits for the next primary-stream event and folds it into the model.
    /// `None` means the stream is no longer delivering; check
    /// [`Self::connection`] for why.
    pub async fn next_update(&mut self) -> Option<Result<Update, ClientError>> {
        match self.controller.next_event().await? {
            Ok(event) => {
                let update = self.model.ingest(&event);
                self.track_question_timer();
                Some(Ok(update))
            }
            Err(e) => Some(Err(e)),
        }
    }

    pub async fn send_message(&mut self, text: &str) -> Result<Vec<Update>, ClientError> {
        let updates = self.dispatcher.send_message(&mut self.model, text).await;
        self.track_question_timer();
        updates
    }

    pub async fn quick_action(&mut self, id: &str) -> Result<Option<Vec<Update>>, ClientError> {
        let updates = self.dispatcher.quick_action(&mut self.model, id).await;
        self.track_question_timer();
        updates
    }

    pub async fn pause(&mut self) -> Result<(), ClientError> {
        self.dispatcher.pause(&mut self.model).await
    }

    pub async fn resume(&mut self) -> Result<Vec<Update>, ClientError> {
        let updates = self.dispatcher.resume(&mut self.model).await;
        self.track_question_timer();
        updates
    }

    pub fn dismiss_break_suggestion(&mut self) {
        self.model.dismiss_break_suggestion();
    }

    pub fn clear_error(&mut self) {
        self.model.clear_error();
    }

    /// Answers the question at the front of the assessment gate. The last
    /// answer submits every answer as one chat message.
    #[instrument(skip(self, answer), fields(session_id = %self.session_id))]
    pub async fn answer_assessment(
        &mut self,
        answer: &str,
    ) -> Result<AssessmentProgress, ClientError> {
        let elapsed = self
            .question_shown_at
            .map(|shown| shown.elapsed().as_secs())
            .unwrap_or(0);
        let (recorded, outcome) = self.model.answer_assessment(answer, elapsed)?;
        self.question_shown_at = None;

        if let Some(source) = &self.feedback {
            match source.feedback(&recorded).await {
                Ok(feedback) => self.model.record_feedback(feedback),
                Err(e) => warn!(question_index = recorded.index, error = %e, "No feedback for answer"),
            }
        }

        match outcome {
            AnswerOutcome::Next => {
                self.track_question_timer();
                Ok(AssessmentProgress::Next)
            }
            AnswerOutcome::Submit(summary) => self.submit_assessment(&summary).await,
        }
    }

    /// Sends the combined answers again after a failed submission.
    pub async fn retry_assessment_submission(
        &mut self,
    ) -> Result<AssessmentProgress, ClientError> {
        if self.model.assessment().stage() != AssessmentStage::Submitting {
            return Err(AssessmentError::NotCollecting.into());
        }
        let summary = self.model.assessment().summary();
        self.submit_assessment(&summary).await
    }

    async fn submit_assessment(
        &mut self,
        summary: &str,
    ) -> Result<AssessmentProgress, ClientError> {
        info!("Submitting assessment answers");
        let updates = self.dispatcher.send_message(&mut self.model, summary).await?;
        self.model.finish_assessment();
        self.track_question_timer();
        Ok(AssessmentProgress::Submitted(updates))
    }

    /// Manual retry after the stream gave up: reconnects from scratch, then
    /// resynchronises the state from the server's status snapshot. The
    /// transcript is never reset.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn retry(&mut self) -> Result<Vec<Update>, ClientError> {
        self.model.clear_error();
        self.controller.retry().await?;
        match self.resync().await {
            Ok(updates) => Ok(updates),
            Err(e) => {
                warn!(error = %e, "Reconnected but could not resync status");
                Ok(Vec::new())
            }
        }
    }

    /// Folds the server's status snapshot into the model.
    pub async fn resync(&mut self) -> Result<Vec<Update>, ClientError> {
        let status = self.dispatcher.status().await?;
        let updates: Vec<Update> = status
            .into_events()
            .iter()
            .map(|event| self.model.ingest(event))
            .collect();
        self.track_question_timer();
        Ok(updates)
    }

    /// Closes the stream and ends the session server-side (best-effort).
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn end(mut self) -> SessionExit {
        let summary = self.dispatcher.end(&mut self.controller).await;
        SessionExit {
            session_id: self.session_id.clone(),
            summary,
            transcript: self.model.state().transcript().to_vec(),
        }
    }

    /// Starts the answer timer when a question becomes visible.
    fn track_question_timer(&mut self) {
        match (self.model.current_question(), self.question_shown_at) {
            (Some(_), None) => self.question_shown_at = Some(Instant::now()),
            (None, Some(_)) => self.question_shown_at = None,
            _ => {}
        }
    }
}

impl std::fmt::Debug for TutorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TutorSession")
            .field("session_id", &self.session_id)
            .field("connection", &self.controller.state())
            .field("phase", self.model.state().phase())
            .finish()
    }
}
