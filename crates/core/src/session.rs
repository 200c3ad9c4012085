//! Session Phase State Machine
//!
//! [`SessionState`] is the single authoritative record of a live session. Its
//! phase, transcript and metrics change only through [`SessionState::apply`],
//! the event reducer. The few local intents the client is allowed to record
//! without a server round-trip (the optimistic user message, the pause flag,
//! the in-flight request flag) have their own narrow methods.

use crate::{
    Effect,
    assessment::AssessmentQuestion,
    event::{EventKind, MetricsPatch, QuestionPrompt, TutorEvent},
    phase::{Phase, StudentLevel},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub state: Option<Phase>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTopic {
    pub section: String,
    pub subtopic: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Progress {
    pub section_index: usize,
    pub subtopic_index: usize,
    pub time_spent_minutes: f64,
}

/// The state of one tutoring session as seen by the client.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: Phase,
    student_level: StudentLevel,
    assessment_score: Option<f64>,
    concepts_covered: BTreeSet<String>,
    current_topic: Option<CurrentTopic>,
    progress: Progress,
    is_paused: bool,
    awaiting_response: bool,
    break_suggestion: Option<String>,
    error: Option<String>,
    finished: bool,
    metrics: BTreeMap<String, f64>,
    transcript: Vec<Message>,
    pending_questions: Vec<AssessmentQuestion>,
    partial: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Read access ---

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn student_level(&self) -> StudentLevel {
        self.student_level
    }

    pub fn assessment_score(&self) -> Option<f64> {
        self.assessment_score
    }

    pub fn concepts_covered(&self) -> &BTreeSet<String> {
        &self.concepts_covered
    }

    pub fn current_topic(&self) -> Option<&CurrentTopic> {
        self.current_topic.as_ref()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// True while a `respond` call is outstanding. New sends are refused.
    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn break_suggestion(&self) -> Option<&str> {
        self.break_suggestion.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn pending_questions(&self) -> &[AssessmentQuestion] {
        &self.pending_questions
    }

    /// Assistant text still being streamed, not yet in the transcript.
    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    // --- Local intents ---

    /// Seeds the transcript from server history when rejoining a session.
    /// Only allowed before any message has been appended.
    pub fn seed_history(&mut self, history: Vec<Message>) {
        if !self.transcript.is_empty() {
            warn!("Ignoring history seed; transcript already has entries");
            return;
        }
        for message in history {
            self.append(message);
        }
    }

    /// Optimistically appends the user's message and marks a response as due.
    pub fn begin_user_turn(&mut self, text: &str) {
        self.append(Message {
            role: Role::User,
            content: text.to_string(),
            timestamp: Utc::now(),
            state: Some(self.phase.clone()),
            agent_id: None,
        });
        self.awaiting_response = true;
    }

    /// Clears the in-flight flag when a response stream ends or fails.
    pub fn end_user_turn(&mut self) {
        self.awaiting_response = false;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.is_paused = paused;
    }

    pub fn dismiss_break_suggestion(&mut self) {
        self.break_suggestion = None;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Drops the questions of a submitted assessment.
    pub fn clear_pending_questions(&mut self) {
        self.pending_questions.clear();
    }

    // --- Reducer ---

    /// Folds one event into the state and returns the signals it raised.
    pub fn apply(&mut self, event: &TutorEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match &event.kind {
            EventKind::AgentSpeak { agent_id, partial: true } => {
                debug!(agent_id = ?agent_id, "Buffering partial assistant content");
                self.partial
                    .get_or_insert_with(String::new)
                    .push_str(&event.content);
            }
            EventKind::AgentSpeak { agent_id, .. } | EventKind::Transition { agent_id } => {
                self.partial = None;
                self.append_assistant(event, agent_id.clone());
            }
            EventKind::AskQuestion(QuestionPrompt::Assessment(question)) => {
                let mut question = question.clone();
                question.index.get_or_insert(self.pending_questions.len());
                debug!(index = ?question.index, "Queued assessment question");
                self.pending_questions.push(question);
            }
            EventKind::AskQuestion(QuestionPrompt::Conversational { .. }) => {
                self.append_assistant(event, event.agent_id().map(str::to_string));
            }
            EventKind::StateChange => {
                if let Some(next) = &event.state {
                    effects.extend(self.enter_phase(next));
                }
            }
            EventKind::SuggestBreak { time_elapsed_minutes } => {
                info!(?time_elapsed_minutes, "Tutor suggested a break");
                self.break_suggestion = Some(event.content.clone());
                effects.push(Effect::SuggestBreak(event.content.clone()));
            }
            EventKind::SessionComplete => {
                self.partial = None;
                self.append_assistant(event, event.agent_id().map(str::to_string));
                self.finished = true;
                effects.push(Effect::SessionFinished);
            }
            EventKind::Ready | EventKind::Complete => {
                self.awaiting_response = false;
                // A rejoin mid-assessment only announces the phase through `ready`.
                if let Some(next) = &event.state {
                    effects.extend(self.enter_phase(next));
                }
            }
            EventKind::Error { message } => {
                warn!(%message, "Tutor reported an error");
                self.error = Some(message.clone());
                effects.push(Effect::ErrorReported(message.clone()));
            }
            EventKind::MetricsUpdate(patch) => self.merge_metrics(patch),
            EventKind::Unknown(kind) => {
                debug!(%kind, "Ignoring unknown event kind");
            }
        }

        effects
    }

    /// Merges a metrics patch without touching the transcript or phase.
    pub fn merge_metrics(&mut self, patch: &MetricsPatch) {
        if let Some(level) = patch.student_level {
            self.student_level = level;
        }
        if let Some(score) = patch.assessment_score {
            self.assessment_score = Some(score);
        }
        self.concepts_covered
            .extend(patch.concepts_covered.iter().cloned());
        if let Some(topic) = &patch.current_topic {
            self.current_topic = Some(topic.clone());
        }
        if let Some(i) = patch.section_index {
            self.progress.section_index = i;
        }
        if let Some(i) = patch.subtopic_index {
            self.progress.subtopic_index = i;
        }
        if let Some(minutes) = patch.time_spent_minutes {
            self.progress.time_spent_minutes = minutes;
        }
        if let Some(paused) = patch.is_paused {
            self.is_paused = paused;
        }
        if let Some(health) = patch.health_score {
            self.metrics.insert("health_score".to_string(), health);
        }
        for (key, value) in &patch.numeric {
            self.metrics.insert(key.clone(), *value);
        }
    }

    /// Moves to `next`, raising the assessment gate when it is entered from
    /// another phase.
    fn enter_phase(&mut self, next: &Phase) -> Option<Effect> {
        let entering_assessment =
            next.is_initial_assessment() && !self.phase.is_initial_assessment();
        self.set_phase(next.clone());
        entering_assessment.then_some(Effect::ActivateAssessment)
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            info!(from = %self.phase, to = %next, "Session phase changed");
            self.phase = next;
        }
    }

    fn append_assistant(&mut self, event: &TutorEvent, agent_id: Option<String>) {
        self.append(Message {
            role: Role::Assistant,
            content: event.content.clone(),
            timestamp: event.timestamp,
            state: event.state.clone(),
            agent_id,
        });
    }

    /// Appends keeping the transcript time-ordered: an entry stamped earlier
    /// than its predecessor (clock skew between client and server) takes the
    /// predecessor's timestamp.
    fn append(&mut self, mut message: Message) {
        if let Some(last) = self.transcript.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.transcript.push(message);
    }
}
