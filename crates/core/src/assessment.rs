//! Assessment Gate
//!
//! When the session enters its initial assessment, the client stops showing
//! the transcript and walks the student through the pending questions one at
//! a time. Answers are collected locally and submitted once, as a single user
//! message, when the last question is answered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq,
    TrueFalse,
    #[default]
    ShortAnswer,
}

impl QuestionKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "mcq" => QuestionKind::Mcq,
            "true_false" => QuestionKind::TrueFalse,
            _ => QuestionKind::ShortAnswer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

/// A question destined for the assessment gate rather than the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentQuestion {
    /// Zero-based position in the assessment. The reducer fills it in from
    /// arrival order when the server omits it.
    pub index: Option<usize>,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
    /// How many questions the assessment has in total, when announced.
    pub total: Option<usize>,
}

impl AssessmentQuestion {
    fn key(&self, position: usize) -> usize {
        self.index.unwrap_or(position)
    }
}

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnswer {
    #[serde(rename = "question_index")]
    pub index: usize,
    pub answer: String,
    pub time_spent_seconds: u64,
}

/// The tutor's verdict on one answer, fetched outside the main stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentFeedback {
    #[serde(rename = "question_index")]
    pub index: usize,
    pub is_correct: bool,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentStage {
    Inactive,
    Collecting,
    Submitting,
}

/// What the caller must do after an answer is recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    /// Show the next question (or wait for it to arrive).
    Next,
    /// Every question is answered. Send this text as one user message, then
    /// call [`AssessmentCoordinator::complete`].
    Submit(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AssessmentError {
    #[error("The assessment is not collecting answers")]
    NotCollecting,
    #[error("No question is waiting for an answer")]
    NoPendingQuestion,
    #[error("An answer must not be empty")]
    EmptyAnswer,
}

/// Drives the assessment gate: `Inactive → Collecting → Submitting → Inactive`.
///
/// The questions themselves live in the session state (appended by the
/// reducer); the coordinator only owns the answers and feedback.
#[derive(Debug)]
pub struct AssessmentCoordinator {
    stage: AssessmentStage,
    answers: BTreeMap<usize, AssessmentAnswer>,
    feedback: BTreeMap<usize, AssessmentFeedback>,
    activations: usize,
}

impl Default for AssessmentCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AssessmentCoordinator {
    pub fn new() -> Self {
        Self {
            stage: AssessmentStage::Inactive,
            answers: BTreeMap::new(),
            feedback: BTreeMap::new(),
            activations: 0,
        }
    }

    pub fn stage(&self) -> AssessmentStage {
        self.stage
    }

    /// True while the gate replaces the transcript view.
    pub fn is_gating(&self) -> bool {
        self.stage != AssessmentStage::Inactive
    }

    /// How many times the gate has opened during this session.
    pub fn activations(&self) -> usize {
        self.activations
    }

    /// Opens the gate. Returns `false` (and changes nothing) unless inactive.
    pub fn activate(&mut self) -> bool {
        if self.stage != AssessmentStage::Inactive {
            debug!(stage = ?self.stage, "Ignoring assessment activation; gate already open");
            return false;
        }
        self.stage = AssessmentStage::Collecting;
        self.answers.clear();
        self.feedback.clear();
        self.activations += 1;
        info!(activation = self.activations, "Assessment gate opened");
        true
    }

    /// The first question without an answer, if the gate is collecting.
    pub fn current_question<'q>(
        &self,
        questions: &'q [AssessmentQuestion],
    ) -> Option<&'q AssessmentQuestion> {
        if self.stage != AssessmentStage::Collecting {
            return None;
        }
        questions
            .iter()
            .enumerate()
            .find(|(pos, q)| !self.answers.contains_key(&q.key(*pos)))
            .map(|(_, q)| q)
    }

    /// The announced question count, falling back to what has arrived.
    pub fn expected_total(questions: &[AssessmentQuestion]) -> usize {
        questions
            .iter()
            .find_map(|q| q.total)
            .unwrap_or(questions.len())
    }

    /// Records an answer to the current question.
    pub fn record_answer(
        &mut self,
        questions: &[AssessmentQuestion],
        answer: &str,
        time_spent_seconds: u64,
    ) -> Result<(AssessmentAnswer, AnswerOutcome), AssessmentError> {
        if self.stage != AssessmentStage::Collecting {
            return Err(AssessmentError::NotCollecting);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AssessmentError::EmptyAnswer);
        }
        let (position, question) = questions
            .iter()
            .enumerate()
            .find(|(pos, q)| !self.answers.contains_key(&q.key(*pos)))
            .ok_or(AssessmentError::NoPendingQuestion)?;

        let recorded = AssessmentAnswer {
            index: question.key(position),
            answer: answer.to_string(),
            time_spent_seconds,
        };
        self.answers.insert(recorded.index, recorded.clone());

        let total = Self::expected_total(questions);
        debug!(index = recorded.index, answered = self.answers.len(), total, "Assessment answer recorded");

        if self.answers.len() >= total {
            self.stage = AssessmentStage::Submitting;
            return Ok((recorded, AnswerOutcome::Submit(self.summary())));
        }
        Ok((recorded, AnswerOutcome::Next))
    }

    pub fn record_feedback(&mut self, feedback: AssessmentFeedback) {
        self.feedback.insert(feedback.index, feedback);
    }

    pub fn feedback_for(&self, index: usize) -> Option<&AssessmentFeedback> {
        self.feedback.get(&index)
    }

    pub fn answers(&self) -> impl Iterator<Item = &AssessmentAnswer> {
        self.answers.values()
    }

    /// `"Q1: a; Q2: b"`, ordered by question index.
    pub fn summary(&self) -> String {
        self.answers
            .values()
            .map(|a| format!("Q{}: {}", a.index + 1, a.answer))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Closes the gate after the summary has been handed to the dispatcher.
    pub fn complete(&mut self) {
        if self.stage == AssessmentStage::Submitting {
            info!(answers = self.answers.len(), "Assessment submitted");
        }
        self.stage = AssessmentStage::Inactive;
        self.answers.clear();
        self.feedback.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(index: usize, total: usize) -> AssessmentQuestion {
        AssessmentQuestion {
            index: Some(index),
            text: format!("Question {}", index + 1),
            kind: QuestionKind::ShortAnswer,
            options: vec![],
            difficulty: Difficulty::Medium,
            total: Some(total),
        }
    }

    #[test]
    fn test_activation_only_from_inactive() {
        let mut coordinator = AssessmentCoordinator::new();
        assert!(coordinator.activate());
        assert!(!coordinator.activate());
        assert_eq!(coordinator.activations(), 1);
        assert_eq!(coordinator.stage(), AssessmentStage::Collecting);
    }

    #[test]
    fn test_answers_require_collecting_stage() {
        let mut coordinator = AssessmentCoordinator::new();
        let questions = vec![question(0, 1)];
        assert_eq!(
            coordinator.record_answer(&questions, "A", 3).unwrap_err(),
            AssessmentError::NotCollecting
        );
    }

    #[test]
    fn test_walks_questions_and_submits_summary_once() {
        let mut coordinator = AssessmentCoordinator::new();
        let questions = vec![question(0, 3), question(1, 3), question(2, 3)];
        coordinator.activate();

        assert_eq!(coordinator.current_question(&questions).unwrap().index, Some(0));
        let (_, outcome) = coordinator.record_answer(&questions, "B", 4).unwrap();
        assert_eq!(outcome, AnswerOutcome::Next);
        assert_eq!(coordinator.current_question(&questions).unwrap().index, Some(1));

        coordinator.record_answer(&questions, " true ", 2).unwrap();
        let (answer, outcome) = coordinator.record_answer(&questions, "photosynthesis", 9).unwrap();
        assert_eq!(answer.index, 2);
        assert_eq!(
            outcome,
            AnswerOutcome::Submit("Q1: B; Q2: true; Q3: photosynthesis".to_string())
        );
        assert_eq!(coordinator.stage(), AssessmentStage::Submitting);
        assert!(coordinator.current_question(&questions).is_none());

        coordinator.complete();
        assert_eq!(coordinator.stage(), AssessmentStage::Inactive);
        assert_eq!(coordinator.answers().count(), 0);
    }

    #[test]
    fn test_waits_for_announced_questions_not_yet_arrived() {
        let mut coordinator = AssessmentCoordinator::new();
        let mut questions = vec![question(0, 2)];
        coordinator.activate();

        let (_, outcome) = coordinator.record_answer(&questions, "A", 1).unwrap();
        assert_eq!(outcome, AnswerOutcome::Next);
        assert!(coordinator.current_question(&questions).is_none());
        assert_eq!(
            coordinator.record_answer(&questions, "B", 1).unwrap_err(),
            AssessmentError::NoPendingQuestion
        );

        questions.push(question(1, 2));
        let (_, outcome) = coordinator.record_answer(&questions, "C", 1).unwrap();
        assert_eq!(outcome, AnswerOutcome::Submit("Q1: A; Q2: C".to_string()));
    }

    #[test]
    fn test_empty_answer_is_rejected() {
        let mut coordinator = AssessmentCoordinator::new();
        coordinator.activate();
        assert_eq!(
            coordinator.record_answer(&[question(0, 1)], "   ", 1).unwrap_err(),
            AssessmentError::EmptyAnswer
        );
    }

    #[test]
    fn test_feedback_is_kept_per_question_until_complete() {
        let mut coordinator = AssessmentCoordinator::new();
        coordinator.activate();
        coordinator.record_feedback(AssessmentFeedback {
            index: 0,
            is_correct: false,
            correct_answer: Some("B".to_string()),
            explanation: None,
        });
        assert!(!coordinator.feedback_for(0).unwrap().is_correct);
        coordinator.complete();
        assert!(coordinator.feedback_for(0).is_none());
    }

    #[test]
    fn test_feedback_deserializes_from_wire_names() {
        let fb: AssessmentFeedback =
            serde_json::from_str(r#"{"question_index":2,"is_correct":true}"#).unwrap();
        assert_eq!(fb.index, 2);
        assert!(fb.correct_answer.is_none());
    }
}
