//! Reconnection controller for the primary session stream.
//!
//! Owns the single open [`StreamHandle`]. A transport failure closes it and
//! starts a bounded sequence of reopen attempts separated by a fixed delay;
//! when the ceiling is reached the controller parks in `Failed` until the
//! user asks for a manual retry.
//!
//! [`ReconnectionController::next_event`] may be dropped at any await point.
//! An attempt is only counted once its open has completed, and the deadline
//! of a pending attempt survives the drop.

use crate::{
    credential::CredentialProvider,
    error::ClientError,
    stream::{StreamConnector, StreamHandle},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tutor_core::event::TutorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct ReconnectionController {
    session_id: String,
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialProvider>,
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    next_attempt_at: Option<Instant>,
    /// Set after the service rejected the stream credential.
    refresh_credential: bool,
    handle: Option<StreamHandle>,
    cancel: CancellationToken,
}

impl ReconnectionController {
    pub fn new(
        session_id: impl Into<String>,
        connector: Arc<dyn StreamConnector>,
        credentials: Arc<dyn CredentialProvider>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            connector,
            credentials,
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            next_attempt_at: None,
            refresh_credential: false,
            handle: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failed reopen attempts in the current sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether [`Self::next_event`] can still produce events without a
    /// manual intervention.
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// A token that, once cancelled, stops any reconnect sequence for good.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the stream for the first time. A failed first open goes through
    /// the same bounded retry sequence as a dropped connection.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.state == ConnectionState::Closed {
            return Err(ClientError::Closed);
        }
        match self.open_once().await {
            Ok(()) => Ok(()),
            Err(ClientError::Credential(e)) => Err(self.fail(ClientError::Credential(e))),
            Err(e) => {
                warn!(error = %e, "Initial connection failed");
                self.reconnect().await
            }
        }
    }

    /// Restarts from scratch after a terminal failure: fresh credential,
    /// fresh connection, attempt counter reset.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn retry(&mut self) -> Result<(), ClientError> {
        if self.state == ConnectionState::Closed {
            return Err(ClientError::Closed);
        }
        info!("Manual retry requested");
        self.close_handle();
        self.attempts = 0;
        self.next_attempt_at = None;
        self.state = ConnectionState::Disconnected;
        self.connect().await
    }

    /// Pulls the next event, reconnecting transparently on transport
    /// failure. Returns `Some(Err)` once when the connection is given up and
    /// `None` when the stream ended, failed earlier or was closed.
    pub async fn next_event(&mut self) -> Option<Result<TutorEvent, ClientError>> {
        loop {
            match self.state {
                ConnectionState::Connected => {}
                ConnectionState::Reconnecting => {
                    // A reconnect sequence interrupted by the caller resumes
                    // where it stopped.
                    if let Err(e) = self.reconnect().await {
                        return self.terminal(e);
                    }
                    continue;
                }
                _ => return None,
            }

            let handle = self.handle.as_mut()?;
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.close();
                    return None;
                }
                item = handle.next() => item,
            };

            match item {
                Some(Ok(event)) => return Some(Ok(event)),
                Some(Err(e)) => {
                    warn!(session_id = %self.session_id, error = %e, "Session stream dropped");
                    self.close_handle();
                    self.state = ConnectionState::Reconnecting;
                }
                None => {
                    info!(session_id = %self.session_id, "Session stream ended");
                    self.close_handle();
                    self.state = ConnectionState::Disconnected;
                    return None;
                }
            }
        }
    }

    /// Closes the stream and cancels any reconnect sequence. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.close_handle();
        if self.state != ConnectionState::Closed {
            debug!(session_id = %self.session_id, "Connection closed");
            self.state = ConnectionState::Closed;
        }
    }

    async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.close_handle();
        self.state = ConnectionState::Reconnecting;

        while self.attempts < self.policy.max_attempts {
            let delay = self.policy.delay;
            let due = *self
                .next_attempt_at
                .get_or_insert_with(|| Instant::now() + delay);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.close();
                    return Err(ClientError::Closed);
                }
                _ = tokio::time::sleep_until(due) => {}
            }

            info!(
                session_id = %self.session_id,
                attempt = self.attempts + 1,
                max_attempts = self.policy.max_attempts,
                "Reconnecting"
            );
            match self.open_once().await {
                Ok(()) => return Ok(()),
                Err(ClientError::Credential(e)) => {
                    return Err(self.fail(ClientError::Credential(e)));
                }
                Err(ClientError::Closed) => {
                    self.close();
                    return Err(ClientError::Closed);
                }
                Err(e) => {
                    self.attempts += 1;
                    self.next_attempt_at = None;
                    warn!(attempt = self.attempts, error = %e, "Reconnect attempt failed");
                }
            }
        }

        Err(self.fail(ClientError::ReconnectExhausted {
            attempts: self.attempts,
        }))
    }

    /// Replaces the current stream with a freshly opened one. The old handle
    /// is closed first so that at most one primary connection exists.
    async fn open_once(&mut self) -> Result<(), ClientError> {
        self.close_handle();
        let credential = if self.refresh_credential {
            debug!(session_id = %self.session_id, "Refreshing rejected stream credential");
            self.credentials.refresh().await?
        } else {
            self.credentials.credential().await?
        };
        let events = match self.connector.open(&self.session_id, &credential).await {
            Ok(events) => events,
            Err(e) => {
                self.refresh_credential = matches!(e, ClientError::Unauthorized(_));
                return Err(e);
            }
        };
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        self.handle = Some(StreamHandle::new(events));
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.next_attempt_at = None;
        self.refresh_credential = false;
        info!(session_id = %self.session_id, "Session stream connected");
        Ok(())
    }

    fn fail(&mut self, cause: ClientError) -> ClientError {
        if self.state != ConnectionState::Closed {
            error!(session_id = %self.session_id, error = %cause, "Giving up on the session stream");
            self.close_handle();
            self.state = ConnectionState::Failed;
        }
        cause
    }

    fn terminal(&self, e: ClientError) -> Option<Result<TutorEvent, ClientError>> {
        match e {
            ClientError::Closed => None,
            e => Some(Err(e)),
        }
    }

    fn close_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }
}

impl Drop for ReconnectionController {
    fn drop(&mut self) {
        self.close();
    }
}
