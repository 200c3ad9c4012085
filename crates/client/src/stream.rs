//! Stream reader: turns a text/event-stream body into [`TutorEvent`]s.

use crate::{api::TutorApi, credential::Credential, error::ClientError};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Response;
use std::pin::Pin;
use tracing::{debug, warn};
use tutor_core::event::{FrameError, TutorEvent};

/// A pull-based sequence of events. Transport failures surface as `Err`
/// items; the sequence ends when the server closes the body.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<TutorEvent, ClientError>> + Send>>;

/// Parses a streaming response body. Malformed frames are logged and
/// skipped; they never end the stream.
pub fn event_stream(response: Response) -> EventStream {
    let frames = response.bytes_stream().eventsource();
    Box::pin(frames.filter_map(|frame| async move {
        match frame {
            Ok(frame) => match TutorEvent::from_frame(&frame.data) {
                Ok(event) => Some(Ok(event)),
                Err(FrameError::Empty) => None,
                Err(e) => {
                    warn!(error = %e, frame = %frame.data, "Dropping malformed frame");
                    None
                }
            },
            Err(e) => Some(Err(ClientError::Stream(e.to_string()))),
        }
    }))
}

/// Opens the primary event stream of a session.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<EventStream, ClientError>;
}

#[async_trait]
impl StreamConnector for TutorApi {
    async fn open(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<EventStream, ClientError> {
        let response = self.open_stream(session_id, credential).await?;
        Ok(event_stream(response))
    }
}

/// An open primary stream. Dropping the inner stream releases the
/// underlying connection.
pub struct StreamHandle {
    events: Option<EventStream>,
}

impl StreamHandle {
    pub fn new(events: EventStream) -> Self {
        Self {
            events: Some(events),
        }
    }

    pub fn is_open(&self) -> bool {
        self.events.is_some()
    }

    /// The next event, `Some(Err)` on transport failure, `None` once the
    /// stream has ended or been closed.
    pub async fn next(&mut self) -> Option<Result<TutorEvent, ClientError>> {
        self.events.as_mut()?.next().await
    }

    /// Closes the stream. Safe to call repeatedly; after it returns, `next`
    /// yields nothing.
    pub fn close(&mut self) {
        if self.events.take().is_some() {
            debug!("Closed session stream");
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tutor_core::event::EventKind;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    #[tokio::test]
    async fn test_frames_parsed_in_order_and_malformed_dropped() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"event\":\"agent_speak\",\"content\":\"one\"}\n\n",
            "data: {not json}\n\n",
            ": keep-alive comment\n\n",
            "data: {\"event\":\"agent_speak\",\"content\":\"two\"}\n\n",
            "data: {\"event\":\"ready\",\"state\":\"lesson_introduction\"}\n\n",
        );
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        let events: Vec<_> = event_stream(response).collect().await;
        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].content, "one");
        assert_eq!(events[1].content, "two");
        assert_eq!(events[2].kind, EventKind::Ready);
    }

    #[tokio::test]
    async fn test_connector_reports_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = TutorApi::new(server.uri()).unwrap();
        let opened = api.open("s1", &Credential::new("stale")).await;
        assert!(matches!(opened, Err(ClientError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let event = TutorEvent::from_frame(r#"{"event":"agent_speak","content":"x"}"#).unwrap();
        let mut handle = StreamHandle::new(Box::pin(stream::iter(vec![Ok(event.clone()), Ok(event)])));

        assert!(handle.next().await.is_some());
        handle.close();
        handle.close();
        assert!(!handle.is_open());
        assert!(handle.next().await.is_none());
    }
}
