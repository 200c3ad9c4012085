//! Tutor Session Core
//!
//! Pure domain logic for a live tutoring session: the wire event model, the
//! phase state machine that folds events into session state, the assessment
//! gate, and the presentation-only overlay signals. Nothing in this crate
//! performs I/O; the client crate drives it.

pub mod assessment;
pub mod event;
pub mod model;
pub mod overlay;
pub mod phase;
pub mod quick_action;
pub mod session;

/// Signals the reducer raises for collaborators outside the state machine.
///
/// This enum decouples the state machine's decisions from the runtime that
/// acts on them (activating the assessment gate, showing a break prompt,
/// leaving the session).
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The session entered the initial assessment phase.
    ActivateAssessment,
    /// The tutor suggests taking a break, with its suggestion text.
    SuggestBreak(String),
    /// The tutor closed the session; no further pedagogical events follow.
    SessionFinished,
    /// The server reported an application error.
    ErrorReported(String),
}
