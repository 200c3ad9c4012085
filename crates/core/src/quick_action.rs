/// The text sent on the student's behalf when a paused session resumes.
pub const RESUME_MESSAGE: &str = "continue";

/// A fixed shortcut that expands to a canonical chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    ExplainMore,
    Example,
    Skip,
    Question,
    Slower,
    Summary,
}

impl QuickAction {
    pub const ALL: [QuickAction; 6] = [
        QuickAction::ExplainMore,
        QuickAction::Example,
        QuickAction::Skip,
        QuickAction::Question,
        QuickAction::Slower,
        QuickAction::Summary,
    ];

    /// Unknown identifiers map to `None`, which callers treat as a no-op.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.id() == id)
    }

    pub fn id(self) -> &'static str {
        match self {
            QuickAction::ExplainMore => "explain_more",
            QuickAction::Example => "example",
            QuickAction::Skip => "skip",
            QuickAction::Question => "question",
            QuickAction::Slower => "slower",
            QuickAction::Summary => "summary",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            QuickAction::ExplainMore => "Can you explain that in more detail?",
            QuickAction::Example => "Can you give me an example?",
            QuickAction::Skip => "I'd like to skip this topic.",
            QuickAction::Question => "I have a question.",
            QuickAction::Slower => "Can you slow down a bit?",
            QuickAction::Summary => "Can you summarize what we've covered so far?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_text_is_canonical() {
        assert_eq!(
            QuickAction::from_id("skip").map(QuickAction::text),
            Some("I'd like to skip this topic.")
        );
        assert_eq!(
            QuickAction::from_id("explain_more").map(QuickAction::text),
            Some("Can you explain that in more detail?")
        );
    }

    #[test]
    fn test_unknown_id_is_none() {
        assert_eq!(QuickAction::from_id("dance"), None);
        assert_eq!(QuickAction::from_id(""), None);
    }

    #[test]
    fn test_ids_are_unique() {
        for action in QuickAction::ALL {
            assert_eq!(QuickAction::from_id(action.id()), Some(action));
        }
    }
}
