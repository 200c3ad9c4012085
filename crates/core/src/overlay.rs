//! Orchestration overlay signals.
//!
//! A secondary, presentation-only view of the event stream: which agent is
//! active, whether it is speaking, when a hand-off animation should play, and
//! when the student's progress health crosses an alert threshold. Nothing here
//! feeds back into [`crate::session::SessionState`].

use crate::event::{EventKind, TutorEvent};
use serde_json::Value;
use tracing::debug;

/// Health score thresholds. Below `warning` the student is struggling; below
/// `critical` intervention is due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning: 0.45,
            critical: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum HealthAlert {
    #[default]
    Healthy,
    Warning,
    Critical,
}

/// One-shot cues for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayCue {
    AgentChanged { from: Option<String>, to: String },
    PlayTransition,
    ProgressCheck(bool),
    HealthAlert(HealthAlert),
}

#[derive(Debug, Clone, Default)]
pub struct OverlaySignals {
    thresholds: HealthThresholds,
    active_agent: Option<String>,
    is_speaking: bool,
    is_checking: bool,
    health_score: Option<f64>,
    alert: HealthAlert,
}

impl OverlaySignals {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub fn active_agent(&self) -> Option<&str> {
        self.active_agent.as_deref()
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn is_checking(&self) -> bool {
        self.is_checking
    }

    pub fn health_score(&self) -> Option<f64> {
        self.health_score
    }

    pub fn alert(&self) -> HealthAlert {
        self.alert
    }

    /// Watches one event. Fields with unexpected shapes are skipped.
    pub fn observe(&mut self, event: &TutorEvent) -> Vec<OverlayCue> {
        let mut cues = Vec::new();

        if let Some(agent) = event.agent_id() {
            if self.active_agent.as_deref() != Some(agent) {
                let from = self.active_agent.replace(agent.to_string());
                debug!(?from, to = agent, "Active agent changed");
                cues.push(OverlayCue::AgentChanged {
                    from: from.clone(),
                    to: agent.to_string(),
                });
                if from.is_some() {
                    cues.push(OverlayCue::PlayTransition);
                }
            }
        }

        match &event.kind {
            EventKind::AgentSpeak { .. } => self.is_speaking = true,
            EventKind::Transition { .. } => {
                self.is_speaking = true;
                if !cues.contains(&OverlayCue::PlayTransition) {
                    cues.push(OverlayCue::PlayTransition);
                }
            }
            EventKind::Ready | EventKind::Complete | EventKind::SessionComplete => {
                self.is_speaking = false
            }
            EventKind::MetricsUpdate(patch) => {
                if let Some(score) = patch.health_score {
                    self.health_score = Some(score);
                    let alert = self.classify(score);
                    if alert > self.alert {
                        cues.push(OverlayCue::HealthAlert(alert));
                    }
                    self.alert = alert;
                }
            }
            _ => {}
        }

        if let Some(checking) = event.data.get("is_checking").and_then(Value::as_bool) {
            if checking != self.is_checking {
                self.is_checking = checking;
                cues.push(OverlayCue::ProgressCheck(checking));
            }
        }

        cues
    }

    fn classify(&self, score: f64) -> HealthAlert {
        if score < self.thresholds.critical {
            HealthAlert::Critical
        } else if score < self.thresholds.warning {
            HealthAlert::Warning
        } else {
            HealthAlert::Healthy
        }
    }
}
