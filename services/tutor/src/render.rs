//! Turns the session model into terminal lines.

use tutor_client::ConnectionState;
use tutor_core::{
    Effect,
    assessment::{AssessmentFeedback, AssessmentQuestion, QuestionKind},
    model::{SessionModel, Update, View},
    overlay::{HealthAlert, OverlayCue},
    session::{Message, Role},
};

/// Remembers what has already been printed so each refresh only emits
/// what is new.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: usize,
    shown_question: Option<usize>,
    shown_feedback: Option<usize>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything in the transcript so far, including the student's own
    /// messages from an earlier visit.
    pub fn history(&mut self, model: &SessionModel) -> Vec<String> {
        let transcript = model.state().transcript();
        let lines = transcript[self.printed..].iter().map(message).collect();
        self.printed = transcript.len();
        lines
    }

    pub fn update(&mut self, model: &SessionModel, update: &Update) -> Vec<String> {
        let mut lines: Vec<String> = update.cues.iter().filter_map(cue).collect();
        lines.extend(self.refresh(model));
        lines.extend(update.effects.iter().filter_map(effect));
        lines
    }

    /// New transcript entries, or the assessment gate while it is open.
    /// The student's own messages are not echoed back.
    pub fn refresh(&mut self, model: &SessionModel) -> Vec<String> {
        match model.view() {
            View::Transcript(transcript) => {
                self.shown_question = None;
                self.shown_feedback = None;
                let lines = transcript[self.printed.min(transcript.len())..]
                    .iter()
                    .filter(|m| m.role != Role::User)
                    .map(message)
                    .collect();
                self.printed = transcript.len();
                lines
            }
            View::Assessment {
                question,
                answered,
                total,
                last_feedback,
            } => {
                let mut lines = Vec::new();
                if let Some(feedback) = last_feedback {
                    if self.shown_feedback != Some(feedback.index) {
                        self.shown_feedback = Some(feedback.index);
                        lines.push(feedback_line(feedback));
                    }
                }
                match question {
                    Some(q) if self.shown_question != Some(answered) => {
                        self.shown_question = Some(answered);
                        lines.extend(question_lines(q, answered, total));
                    }
                    None if self.shown_question != Some(answered) && answered > 0 => {
                        self.shown_question = Some(answered);
                        lines.push("(waiting for the next question...)".to_string());
                    }
                    _ => {}
                }
                lines
            }
        }
    }
}

pub fn message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you> {}", message.content),
        Role::System => format!("* {}", message.content),
        Role::Assistant => format!(
            "{}> {}",
            message.agent_id.as_deref().unwrap_or("tutor"),
            message.content
        ),
    }
}

fn question_lines(question: &AssessmentQuestion, answered: usize, total: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "[assessment {}/{}] {}",
        answered + 1,
        total.max(answered + 1),
        question.text
    )];
    match question.kind {
        QuestionKind::Mcq => lines.extend(
            question
                .options
                .iter()
                .enumerate()
                .map(|(i, option)| format!("  {}) {}", (b'A' + (i % 26) as u8) as char, option)),
        ),
        QuestionKind::TrueFalse => lines.push("  (True / False)".to_string()),
        QuestionKind::ShortAnswer => {}
    }
    lines
}

fn feedback_line(feedback: &AssessmentFeedback) -> String {
    let verdict = if feedback.is_correct { "Correct" } else { "Not quite" };
    let mut line = verdict.to_string();
    if let Some(answer) = feedback.correct_answer.as_deref().filter(|_| !feedback.is_correct) {
        line.push_str(&format!(" (answer: {answer})"));
    }
    if let Some(explanation) = &feedback.explanation {
        line.push_str(&format!(": {explanation}"));
    }
    line
}

fn cue(cue: &OverlayCue) -> Option<String> {
    match cue {
        OverlayCue::AgentChanged { from: Some(_), to } => Some(format!("-- {to} takes over --")),
        OverlayCue::HealthAlert(HealthAlert::Warning) => {
            Some("-- this seems tricky; try /explain_more or /slower --".to_string())
        }
        OverlayCue::HealthAlert(HealthAlert::Critical) => {
            Some("-- you may be stuck; consider /question to ask for help --".to_string())
        }
        OverlayCue::ProgressCheck(true) => Some("-- checking your progress --".to_string()),
        _ => None,
    }
}

fn effect(effect: &Effect) -> Option<String> {
    match effect {
        Effect::ActivateAssessment => None,
        Effect::SuggestBreak(text) => Some(format!("Break suggested: {text} (/pause or /dismiss)")),
        Effect::SessionFinished => Some("Session complete.".to_string()),
        Effect::ErrorReported(text) => Some(format!("error: {text}")),
    }
}

pub fn status(model: &SessionModel, connection: ConnectionState) -> String {
    let state = model.state();
    let mut line = format!(
        "phase: {} | level: {:?} | connection: {:?}",
        state.phase(),
        state.student_level(),
        connection
    );
    if let Some(topic) = state.current_topic() {
        line.push_str(&format!(" | topic: {} / {}", topic.section, topic.subtopic));
    }
    if let Some(score) = state.assessment_score() {
        line.push_str(&format!(" | score: {:.0}%", score * 100.0));
    }
    line.push_str(&format!(
        " | concepts: {} | time: {:.0} min",
        state.concepts_covered().len(),
        state.progress().time_spent_minutes
    ));
    if state.is_paused() {
        line.push_str(" | paused");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::event::TutorEvent;

    fn ingest(model: &mut SessionModel, json: &str) -> Update {
        model.ingest(&TutorEvent::from_frame(json).unwrap())
    }

    #[test]
    fn test_refresh_prints_only_new_assistant_lines() {
        let mut model = SessionModel::default();
        let mut renderer = Renderer::new();
        ingest(&mut model, r#"{"event":"agent_speak","content":"Welcome","data":{"agent_id":"tutor"}}"#);
        assert_eq!(renderer.refresh(&model), vec!["tutor> Welcome"]);

        model.begin_user_turn("hi");
        model.end_user_turn();
        ingest(&mut model, r#"{"event":"agent_speak","content":"Hello!"}"#);
        assert_eq!(renderer.refresh(&model), vec!["tutor> Hello!"]);
        assert!(renderer.refresh(&model).is_empty());
    }

    #[test]
    fn test_assessment_question_shown_once_with_options() {
        let mut model = SessionModel::default();
        let mut renderer = Renderer::new();
        ingest(&mut model, r#"{"event":"state_change","state":"initial_assessment"}"#);
        let update = ingest(
            &mut model,
            r#"{"event":"ask_question","content":"Pick one","data":{"type":"assessment","question_type":"mcq","options":["3","4"],"total_questions":2}}"#,
        );

        let lines = renderer.update(&model, &update);
        assert_eq!(lines, vec!["[assessment 1/2] Pick one", "  A) 3", "  B) 4"]);
        assert!(renderer.refresh(&model).is_empty());
    }

    #[test]
    fn test_break_and_error_effects() {
        let mut model = SessionModel::default();
        let mut renderer = Renderer::new();
        let update = ingest(&mut model, r#"{"event":"suggest_break","content":"Stretch?"}"#);
        assert_eq!(
            renderer.update(&model, &update),
            vec!["Break suggested: Stretch? (/pause or /dismiss)"]
        );
        let update = ingest(&mut model, r#"{"event":"error","message":"LLM timeout"}"#);
        assert_eq!(renderer.update(&model, &update), vec!["error: LLM timeout"]);
    }

    #[test]
    fn test_status_line() {
        let mut model = SessionModel::default();
        ingest(
            &mut model,
            r#"{"event":"metrics_update","data":{"assessment_score":0.5,"concepts_covered":["a","b"]}}"#,
        );
        let line = status(&model, ConnectionState::Connected);
        assert!(line.contains("score: 50%"));
        assert!(line.contains("concepts: 2"));
        assert!(line.contains("Connected"));
    }
}
