//! Command dispatcher: the student's side of the conversation.
//!
//! Every command fetches a credential right before its request and, when
//! the service rejects it, retries exactly once with a refreshed one.

use crate::{
    api::{SessionStatus, TutorApi},
    credential::{Credential, CredentialProvider},
    error::ClientError,
    reconnect::ReconnectionController,
    stream::event_stream,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::{future::Future, sync::Arc};
use tracing::{debug, info, instrument, warn};
use tutor_core::{
    assessment::{AssessmentAnswer, AssessmentFeedback},
    model::{SessionModel, Update},
    quick_action::{QuickAction, RESUME_MESSAGE},
    session::Message,
};

/// Grades a single assessment answer outside the main stream.
#[async_trait]
pub trait FeedbackSource: Send + Sync {
    async fn feedback(&self, answer: &AssessmentAnswer) -> Result<AssessmentFeedback, ClientError>;
}

pub struct CommandDispatcher {
    api: TutorApi,
    credentials: Arc<dyn CredentialProvider>,
    session_id: String,
}

impl CommandDispatcher {
    pub fn new(
        api: TutorApi,
        credentials: Arc<dyn CredentialProvider>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            credentials,
            session_id: session_id.into(),
        }
    }

    /// Sends one chat message and folds the response events into the model
    /// in arrival order.
    ///
    /// The message is appended to the transcript before the request goes
    /// out and stays there if delivery fails.
    #[instrument(skip(self, model, text), fields(session_id = %self.session_id))]
    pub async fn send_message(
        &self,
        model: &mut SessionModel,
        text: &str,
    ) -> Result<Vec<Update>, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if model.state().awaiting_response() {
            return Err(ClientError::Busy);
        }

        model.begin_user_turn(text);
        let result = self.fold_response(model, text).await;
        model.end_user_turn();

        if let Err(e) = &result {
            warn!(error = %e, "Message delivery failed");
        }
        result
    }

    async fn fold_response(
        &self,
        model: &mut SessionModel,
        text: &str,
    ) -> Result<Vec<Update>, ClientError> {
        let response = self
            .authorized(move |credential| async move {
                self.api.respond(&self.session_id, text, &credential).await
            })
            .await
            .map_err(send_failure)?;

        let mut events = event_stream(response);
        let mut updates = Vec::new();
        while let Some(item) = events.next().await {
            let event = item.map_err(send_failure)?;
            updates.push(model.ingest(&event));
        }
        debug!(events = updates.len(), "Response stream finished");
        Ok(updates)
    }

    /// Expands a quick action into its canonical message. Unknown ids do
    /// nothing and return `None`.
    pub async fn quick_action(
        &self,
        model: &mut SessionModel,
        id: &str,
    ) -> Result<Option<Vec<Update>>, ClientError> {
        let Some(action) = QuickAction::from_id(id) else {
            debug!(id, "Ignoring unknown quick action");
            return Ok(None);
        };
        self.send_message(model, action.text()).await.map(Some)
    }

    /// Marks the session paused locally, then tells the service.
    #[instrument(skip(self, model), fields(session_id = %self.session_id))]
    pub async fn pause(&self, model: &mut SessionModel) -> Result<(), ClientError> {
        model.set_paused(true);
        self.authorized(move |credential| async move {
            self.api.pause(&self.session_id, &credential).await
        })
        .await?;
        info!("Session paused");
        Ok(())
    }

    /// Resuming is a plain chat message; the service has no resume command.
    #[instrument(skip(self, model), fields(session_id = %self.session_id))]
    pub async fn resume(&self, model: &mut SessionModel) -> Result<Vec<Update>, ClientError> {
        if model.state().awaiting_response() {
            return Err(ClientError::Busy);
        }
        model.set_paused(false);
        self.send_message(model, RESUME_MESSAGE).await
    }

    /// Closes the stream, then asks the service to end the session. The
    /// server call is best-effort: a failure is logged, not returned.
    #[instrument(skip(self, controller), fields(session_id = %self.session_id))]
    pub async fn end(&self, controller: &mut ReconnectionController) -> Option<Value> {
        controller.close();
        match self
            .authorized(move |credential| async move {
                self.api.end(&self.session_id, &credential).await
            })
            .await
        {
            Ok(summary) => {
                info!("Session ended");
                summary
            }
            Err(e) => {
                warn!(error = %e, "Failed to end the session on the server");
                None
            }
        }
    }

    pub async fn status(&self) -> Result<SessionStatus, ClientError> {
        self.authorized(move |credential| async move {
            self.api.status(&self.session_id, &credential).await
        })
        .await
    }

    pub async fn history(&self) -> Result<Vec<Message>, ClientError> {
        self.authorized(move |credential| async move {
            self.api.history(&self.session_id, &credential).await
        })
        .await
    }

    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, ClientError>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let credential = self.credentials.credential().await?;
        match call(credential).await {
            Err(ClientError::Unauthorized(status)) => {
                warn!(%status, "Credential rejected; retrying once with a fresh one");
                let credential = self.credentials.refresh().await?;
                call(credential).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl FeedbackSource for CommandDispatcher {
    async fn feedback(&self, answer: &AssessmentAnswer) -> Result<AssessmentFeedback, ClientError> {
        self.authorized(move |credential| async move {
            self.api
                .assessment_feedback(&self.session_id, answer, &credential)
                .await
        })
        .await
    }
}

fn send_failure(e: ClientError) -> ClientError {
    match e {
        ClientError::Transport(e) => ClientError::SendFailed(e.to_string()),
        ClientError::Stream(reason) => ClientError::SendFailed(reason),
        other => other,
    }
}
