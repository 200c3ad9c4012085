//! The session model: every piece of client-side state for one session,
//! behind a single entry point for events.

use crate::{
    Effect,
    assessment::{
        AnswerOutcome, AssessmentAnswer, AssessmentCoordinator, AssessmentError,
        AssessmentFeedback, AssessmentQuestion,
    },
    event::TutorEvent,
    overlay::{HealthThresholds, OverlayCue, OverlaySignals},
    session::{Message, SessionState},
};

/// What one ingested event changed, for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub effects: Vec<Effect>,
    pub cues: Vec<OverlayCue>,
}

/// What the student should currently be looking at.
#[derive(Debug, PartialEq)]
pub enum View<'a> {
    Transcript(&'a [Message]),
    /// The assessment gate replaces the transcript until it is submitted.
    /// `question` is `None` while the next announced question has not arrived.
    Assessment {
        question: Option<&'a AssessmentQuestion>,
        answered: usize,
        total: usize,
        last_feedback: Option<&'a AssessmentFeedback>,
    },
}

#[derive(Debug, Default)]
pub struct SessionModel {
    state: SessionState,
    overlay: OverlaySignals,
    assessment: AssessmentCoordinator,
    last_answered: Option<usize>,
}

impl SessionModel {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            state: SessionState::new(),
            overlay: OverlaySignals::new(thresholds),
            assessment: AssessmentCoordinator::new(),
            last_answered: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn overlay(&self) -> &OverlaySignals {
        &self.overlay
    }

    pub fn assessment(&self) -> &AssessmentCoordinator {
        &self.assessment
    }

    /// Feeds one event through the reducer, then the overlay. The overlay
    /// never sees the reducer's output and cannot affect it.
    pub fn ingest(&mut self, event: &TutorEvent) -> Update {
        let effects = self.state.apply(event);
        let cues = self.overlay.observe(event);
        if effects.contains(&Effect::ActivateAssessment) {
            self.assessment.activate();
            self.last_answered = None;
        }
        Update { effects, cues }
    }

    pub fn seed_history(&mut self, history: Vec<Message>) {
        self.state.seed_history(history);
    }

    pub fn begin_user_turn(&mut self, text: &str) {
        self.state.begin_user_turn(text);
    }

    pub fn end_user_turn(&mut self) {
        self.state.end_user_turn();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.set_paused(paused);
    }

    pub fn dismiss_break_suggestion(&mut self) {
        self.state.dismiss_break_suggestion();
    }

    pub fn clear_error(&mut self) {
        self.state.clear_error();
    }

    pub fn current_question(&self) -> Option<&AssessmentQuestion> {
        self.assessment
            .current_question(self.state.pending_questions())
    }

    pub fn answer_assessment(
        &mut self,
        answer: &str,
        time_spent_seconds: u64,
    ) -> Result<(AssessmentAnswer, AnswerOutcome), AssessmentError> {
        let recorded =
            self.assessment
                .record_answer(self.state.pending_questions(), answer, time_spent_seconds)?;
        self.last_answered = Some(recorded.0.index);
        Ok(recorded)
    }

    pub fn record_feedback(&mut self, feedback: AssessmentFeedback) {
        self.assessment.record_feedback(feedback);
    }

    /// Closes the gate once its summary has been dispatched.
    pub fn finish_assessment(&mut self) {
        self.assessment.complete();
        self.state.clear_pending_questions();
        self.last_answered = None;
    }

    pub fn view(&self) -> View<'_> {
        if !self.assessment.is_gating() {
            return View::Transcript(self.state.transcript());
        }
        let questions = self.state.pending_questions();
        View::Assessment {
            question: self.assessment.current_question(questions),
            answered: self.assessment.answers().count(),
            total: AssessmentCoordinator::expected_total(questions),
            last_feedback: self
                .last_answered
                .and_then(|index| self.assessment.feedback_for(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AssessmentStage;

    fn ingest(model: &mut SessionModel, json: &str) -> Update {
        model.ingest(&TutorEvent::from_frame(json).unwrap())
    }

    #[test]
    fn test_assessment_gate_replaces_transcript_until_finished() {
        let mut model = SessionModel::default();
        ingest(&mut model, r#"{"event":"agent_speak","content":"Hello"}"#);
        let update = ingest(&mut model, r#"{"event":"state_change","state":"initial_assessment"}"#);
        assert_eq!(update.effects, vec![Effect::ActivateAssessment]);
        assert_eq!(model.assessment().stage(), AssessmentStage::Collecting);

        ingest(
            &mut model,
            r#"{"event":"ask_question","content":"Q1?","data":{"type":"assessment","question_index":0,"total_questions":2}}"#,
        );
        ingest(&mut model, r#"{"event":"agent_speak","content":"Take your time"}"#);
        ingest(
            &mut model,
            r#"{"event":"ask_question","content":"Q2?","data":{"type":"assessment","question_index":1,"total_questions":2}}"#,
        );

        match model.view() {
            View::Assessment {
                question,
                answered,
                total,
                ..
            } => {
                assert_eq!(question.unwrap().text, "Q1?");
                assert_eq!(answered, 0);
                assert_eq!(total, 2);
            }
            other => panic!("expected the assessment gate, got {:?}", other),
        }

        model.answer_assessment("A", 5).unwrap();
        model.record_feedback(AssessmentFeedback {
            index: 0,
            is_correct: true,
            correct_answer: None,
            explanation: None,
        });
        let View::Assessment { last_feedback, .. } = model.view() else {
            panic!("gate closed early");
        };
        assert!(last_feedback.unwrap().is_correct);

        let (_, outcome) = model.answer_assessment("B", 7).unwrap();
        assert_eq!(outcome, AnswerOutcome::Submit("Q1: A; Q2: B".to_string()));

        model.finish_assessment();
        let View::Transcript(messages) = model.view() else {
            panic!("gate should be closed");
        };
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello", "Take your time"]);
        assert!(model.state().pending_questions().is_empty());
    }

    #[test]
    fn test_overlay_updates_alongside_reducer() {
        let mut model = SessionModel::default();
        let update = ingest(
            &mut model,
            r#"{"event":"agent_speak","content":"Hi","data":{"agent_id":"tutor"}}"#,
        );
        assert_eq!(update.cues.len(), 1);
        assert_eq!(model.overlay().active_agent(), Some("tutor"));
        assert_eq!(model.state().transcript()[0].agent_id.as_deref(), Some("tutor"));
    }
}
