//! Tutor Session Client
//!
//! Connects to a live tutoring session: reads the primary event stream,
//! keeps it alive across transport failures, and sends the student's
//! messages and commands. All state decisions are delegated to
//! [`tutor_core`]; this crate only moves events and requests.

pub mod api;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod reconnect;
pub mod session;
pub mod stream;

pub use api::{CreateSessionRequest, SessionStatus, TutorApi};
pub use credential::{Credential, CredentialProvider, FileCredentialProvider, StaticCredentialProvider};
pub use error::{ClientError, CredentialError};
pub use reconnect::{ConnectionState, ReconnectPolicy};
pub use session::{AssessmentProgress, SessionExit, SessionOptions, TutorSession};
