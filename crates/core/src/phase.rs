use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The named stage a tutoring session is in.
///
/// Pedagogical phases come from the tutor service; `Connecting`, `Paused`,
/// `Assessment`, `Complete` and `Error` are client-side stages. Tags this
/// client does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    CourseSetup,
    InitialAssessment,
    AssessmentReview,
    LessonIntroduction,
    ConceptExplanation,
    ExampleDemonstration,
    GuidedPractice,
    CheckUnderstanding,
    TopicSummary,
    LessonComplete,
    BreakSuggestion,
    AnsweringQuestion,
    HandlingConfusion,
    SessionComplete,
    SessionPaused,
    Paused,
    Assessment,
    Complete,
    Error,
    Other(String),
}

impl Phase {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "idle" => Phase::Idle,
            "connecting" => Phase::Connecting,
            "course_setup" => Phase::CourseSetup,
            "initial_assessment" => Phase::InitialAssessment,
            "assessment_review" => Phase::AssessmentReview,
            "lesson_introduction" => Phase::LessonIntroduction,
            "concept_explanation" => Phase::ConceptExplanation,
            "example_demonstration" => Phase::ExampleDemonstration,
            "guided_practice" => Phase::GuidedPractice,
            "check_understanding" => Phase::CheckUnderstanding,
            "topic_summary" => Phase::TopicSummary,
            "lesson_complete" => Phase::LessonComplete,
            "break_suggestion" => Phase::BreakSuggestion,
            "answering_question" => Phase::AnsweringQuestion,
            "handling_confusion" => Phase::HandlingConfusion,
            "session_complete" => Phase::SessionComplete,
            "session_paused" => Phase::SessionPaused,
            "paused" => Phase::Paused,
            "assessment" => Phase::Assessment,
            "complete" => Phase::Complete,
            "error" => Phase::Error,
            other => Phase::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::CourseSetup => "course_setup",
            Phase::InitialAssessment => "initial_assessment",
            Phase::AssessmentReview => "assessment_review",
            Phase::LessonIntroduction => "lesson_introduction",
            Phase::ConceptExplanation => "concept_explanation",
            Phase::ExampleDemonstration => "example_demonstration",
            Phase::GuidedPractice => "guided_practice",
            Phase::CheckUnderstanding => "check_understanding",
            Phase::TopicSummary => "topic_summary",
            Phase::LessonComplete => "lesson_complete",
            Phase::BreakSuggestion => "break_suggestion",
            Phase::AnsweringQuestion => "answering_question",
            Phase::HandlingConfusion => "handling_confusion",
            Phase::SessionComplete => "session_complete",
            Phase::SessionPaused => "session_paused",
            Phase::Paused => "paused",
            Phase::Assessment => "assessment",
            Phase::Complete => "complete",
            Phase::Error => "error",
            Phase::Other(tag) => tag,
        }
    }

    /// The phase whose entry opens the assessment gate.
    pub fn is_initial_assessment(&self) -> bool {
        matches!(self, Phase::InitialAssessment)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Phase::parse(&tag))
    }
}

/// Student proficiency as judged by the initial assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StudentLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl StudentLevel {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "beginner" => Some(StudentLevel::Beginner),
            "intermediate" => Some(StudentLevel::Intermediate),
            "advanced" => Some(StudentLevel::Advanced),
            _ => None,
        }
    }
}
