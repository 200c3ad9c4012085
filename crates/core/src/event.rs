//! Tutor Event Wire Model
//!
//! Every frame on the session stream (and on a `respond` response) is one JSON
//! object. This module turns a frame's payload into a [`TutorEvent`] whose
//! [`EventKind`] carries only the fields the reducers use, validated here so
//! the rest of the crate never inspects untyped maps.

use crate::{assessment::AssessmentQuestion, phase::Phase, phase::StudentLevel, session::CurrentTopic};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Failure to turn a frame payload into an event.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// The frame as it appears on the wire. Absent fields are tolerated because
/// server-synthesized frames (`ready`, `complete`, `error`) omit most of them.
#[derive(Deserialize, Debug)]
struct RawFrame {
    event: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// One immutable event from the tutor service.
#[derive(Debug, Clone, PartialEq)]
pub struct TutorEvent {
    pub kind: EventKind,
    pub content: String,
    pub state: Option<Phase>,
    pub timestamp: DateTime<Utc>,
    /// The untouched `data` object. Kept for presentation-only consumers such
    /// as the overlay; the state machine reads `kind` instead.
    pub data: Map<String, Value>,
}

/// The typed payload of a [`TutorEvent`], keyed by the wire `event` field.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    AgentSpeak { agent_id: Option<String>, partial: bool },
    Transition { agent_id: Option<String> },
    AskQuestion(QuestionPrompt),
    StateChange,
    SuggestBreak { time_elapsed_minutes: Option<f64> },
    SessionComplete,
    Ready,
    Complete,
    Error { message: String },
    MetricsUpdate(MetricsPatch),
    /// A kind this client does not understand. Reducers ignore it.
    Unknown(String),
}

/// Either a question for the assessment gate or an ordinary prompt that
/// belongs in the transcript (practice, understanding check, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionPrompt {
    Assessment(AssessmentQuestion),
    Conversational { question_type: Option<String> },
}

/// Fields a `metrics_update` (or a status snapshot) may carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsPatch {
    pub student_level: Option<StudentLevel>,
    pub assessment_score: Option<f64>,
    pub concepts_covered: Vec<String>,
    pub current_topic: Option<CurrentTopic>,
    pub section_index: Option<usize>,
    pub subtopic_index: Option<usize>,
    pub time_spent_minutes: Option<f64>,
    pub is_paused: Option<bool>,
    pub health_score: Option<f64>,
    /// Any other numeric field, by name.
    pub numeric: BTreeMap<String, f64>,
}

const PATCH_KEYS: &[&str] = &[
    "student_level",
    "assessment_score",
    "concepts_covered",
    "current_topic",
    "section_index",
    "subtopic_index",
    "time_spent_minutes",
    "is_paused",
    "health_score",
    "progress",
];

impl TutorEvent {
    /// Parses one frame payload (the JSON after `data:`).
    pub fn from_frame(payload: &str) -> Result<Self, FrameError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        let raw: RawFrame = serde_json::from_str(payload)?;
        Ok(Self::from_raw(raw))
    }

    /// Builds an event from a JSON value already in hand.
    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_value(value)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawFrame) -> Self {
        let data = raw.data.unwrap_or_default();
        let content = raw.content.unwrap_or_default();
        let state = raw.state.as_deref().map(Phase::parse);
        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let kind = match raw.event.as_str() {
            "agent_speak" => EventKind::AgentSpeak {
                agent_id: str_field(&data, "agent_id"),
                partial: data.get("partial").and_then(Value::as_bool).unwrap_or(false),
            },
            "transition" => EventKind::Transition {
                agent_id: str_field(&data, "agent_id"),
            },
            "ask_question" => EventKind::AskQuestion(parse_question(&data, &content)),
            "state_change" => EventKind::StateChange,
            "suggest_break" => EventKind::SuggestBreak {
                time_elapsed_minutes: data.get("time_elapsed_minutes").and_then(Value::as_f64),
            },
            "session_complete" => EventKind::SessionComplete,
            "ready" => EventKind::Ready,
            "complete" => EventKind::Complete,
            "error" => EventKind::Error {
                message: str_field(&data, "message")
                    .or_else(|| str_field(&data, "detail"))
                    .or(raw.message)
                    .or_else(|| (!content.is_empty()).then(|| content.clone()))
                    .unwrap_or_else(|| "The tutor reported an unknown error.".to_string()),
            },
            "metrics_update" => EventKind::MetricsUpdate(MetricsPatch::from_data(&data)),
            other => EventKind::Unknown(other.to_string()),
        };

        Self {
            kind,
            content,
            state,
            timestamp,
            data,
        }
    }

    /// The agent identity attached to this event, if any.
    pub fn agent_id(&self) -> Option<&str> {
        self.data.get("agent_id").and_then(Value::as_str)
    }
}

impl MetricsPatch {
    /// Reads a patch from a `data` object. Fields with the wrong shape are
    /// skipped rather than failing the whole event.
    pub fn from_data(data: &Map<String, Value>) -> Self {
        let progress = data.get("progress").and_then(Value::as_object);
        let lookup = |key: &str| {
            data.get(key)
                .or_else(|| progress.and_then(|p| p.get(key)))
        };

        let numeric = data
            .iter()
            .filter(|(key, _)| !PATCH_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| value.as_f64().map(|n| (key.clone(), n)))
            .collect();

        Self {
            student_level: lookup("student_level")
                .and_then(Value::as_str)
                .and_then(StudentLevel::parse),
            assessment_score: lookup("assessment_score").and_then(Value::as_f64),
            concepts_covered: lookup("concepts_covered")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|c| c.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            current_topic: lookup("current_topic").and_then(parse_topic),
            section_index: lookup("section_index").and_then(as_index),
            subtopic_index: lookup("subtopic_index").and_then(as_index),
            time_spent_minutes: lookup("time_spent_minutes").and_then(Value::as_f64),
            is_paused: lookup("is_paused").and_then(Value::as_bool),
            health_score: lookup("health_score").and_then(Value::as_f64),
            numeric,
        }
    }
}

fn parse_question(data: &Map<String, Value>, content: &str) -> QuestionPrompt {
    let question_type = str_field(data, "type");
    if question_type.as_deref() != Some("assessment") {
        return QuestionPrompt::Conversational { question_type };
    }
    QuestionPrompt::Assessment(AssessmentQuestion {
        index: data.get("question_index").and_then(as_index),
        text: content.to_string(),
        kind: str_field(data, "question_type")
            .map(|t| crate::assessment::QuestionKind::parse(&t))
            .unwrap_or_default(),
        options: data
            .get("options")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|o| o.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        difficulty: str_field(data, "difficulty")
            .map(|d| crate::assessment::Difficulty::parse(&d))
            .unwrap_or_default(),
        total: data.get("total_questions").and_then(as_index),
    })
}

fn parse_topic(value: &Value) -> Option<CurrentTopic> {
    let topic = value.as_object()?;
    Some(CurrentTopic {
        section: topic.get("section").and_then(title_of)?,
        subtopic: topic.get("subtopic").and_then(title_of)?,
    })
}

/// Topic parts arrive either as plain names or as outline objects with a title.
fn title_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("title").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn as_index(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

fn str_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// The service emits naive UTC ISO-8601 timestamps; RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::QuestionKind;
    use chrono::Timelike;

    #[test]
    fn test_parses_agent_speak_frame() {
        let event = TutorEvent::from_frame(
            r#"{"event":"agent_speak","content":"Welcome","data":{"agent_id":"tutor"},"state":"course_setup","timestamp":"2025-03-01T10:15:30.250000"}"#,
        )
        .unwrap();

        assert_eq!(
            event.kind,
            EventKind::AgentSpeak {
                agent_id: Some("tutor".to_string()),
                partial: false
            }
        );
        assert_eq!(event.content, "Welcome");
        assert_eq!(event.state, Some(Phase::CourseSetup));
        assert_eq!(event.timestamp.hour(), 10);
        assert_eq!(event.agent_id(), Some("tutor"));
    }

    #[test]
    fn test_server_synthesized_ready_frame_has_no_data() {
        let event = TutorEvent::from_frame(r#"{"event":"ready","state":"lesson_introduction"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Ready);
        assert!(event.content.is_empty());
        assert!(event.data.is_empty());
        assert_eq!(event.state, Some(Phase::LessonIntroduction));
    }

    #[test]
    fn test_error_frame_prefers_data_message_then_top_level() {
        let from_data =
            TutorEvent::from_frame(r#"{"event":"error","data":{"message":"quota exceeded"}}"#).unwrap();
        assert_eq!(
            from_data.kind,
            EventKind::Error {
                message: "quota exceeded".to_string()
            }
        );

        let top_level =
            TutorEvent::from_frame(r#"{"event":"error","message":"Session not found"}"#).unwrap();
        assert_eq!(
            top_level.kind,
            EventKind::Error {
                message: "Session not found".to_string()
            }
        );
    }

    #[test]
    fn test_assessment_question_fields_are_typed() {
        let event = TutorEvent::from_frame(
            r#"{"event":"ask_question","content":"What is 2+2?","data":{"type":"assessment","question_index":1,"question_type":"mcq","options":["A) 3","B) 4"],"total_questions":5}}"#,
        )
        .unwrap();

        match event.kind {
            EventKind::AskQuestion(QuestionPrompt::Assessment(q)) => {
                assert_eq!(q.index, Some(1));
                assert_eq!(q.kind, QuestionKind::Mcq);
                assert_eq!(q.options, vec!["A) 3", "B) 4"]);
                assert_eq!(q.total, Some(5));
                assert_eq!(q.text, "What is 2+2?");
            }
            other => panic!("expected assessment question, got {:?}", other),
        }
    }

    #[test]
    fn test_practice_question_is_conversational() {
        let event = TutorEvent::from_frame(
            r#"{"event":"ask_question","content":"Try this one","data":{"type":"practice"}}"#,
        )
        .unwrap();
        assert_eq!(
            event.kind,
            EventKind::AskQuestion(QuestionPrompt::Conversational {
                question_type: Some("practice".to_string())
            })
        );
    }

    #[test]
    fn test_metrics_patch_reads_nested_progress_and_extra_numbers() {
        let event = TutorEvent::from_frame(
            r#"{"event":"metrics_update","data":{"student_level":"advanced","health_score":0.4,"interference":0.2,"progress":{"section_index":2,"subtopic_index":1,"time_spent_minutes":12.5},"current_topic":{"section":{"title":"Numbers"},"subtopic":"Primes"}}}"#,
        )
        .unwrap();

        let EventKind::MetricsUpdate(patch) = event.kind else {
            panic!("expected metrics update");
        };
        assert_eq!(patch.student_level, Some(StudentLevel::Advanced));
        assert_eq!(patch.section_index, Some(2));
        assert_eq!(patch.subtopic_index, Some(1));
        assert_eq!(patch.time_spent_minutes, Some(12.5));
        assert_eq!(patch.health_score, Some(0.4));
        assert_eq!(patch.numeric.get("interference"), Some(&0.2));
        assert!(!patch.numeric.contains_key("health_score"));
        let topic = patch.current_topic.unwrap();
        assert_eq!(topic.section, "Numbers");
        assert_eq!(topic.subtopic, "Primes");
    }

    #[test]
    fn test_unknown_kind_is_kept() {
        let event = TutorEvent::from_frame(r#"{"event":"session_start","state":"idle"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unknown("session_start".to_string()));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(matches!(TutorEvent::from_frame("   "), Err(FrameError::Empty)));
        assert!(matches!(TutorEvent::from_frame("{not json"), Err(FrameError::Json(_))));
        assert!(matches!(
            TutorEvent::from_frame(r#"{"content":"no kind"}"#),
            Err(FrameError::Json(_))
        ));
    }
}
