//! Parses lines typed at the prompt.

use tutor_core::quick_action::QuickAction;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Free text: a chat message, or an answer while the assessment is open.
    Say(String),
    Quick(QuickAction),
    Pause,
    Resume,
    End,
    Retry,
    Resubmit,
    Status,
    Dismiss,
    Help,
    Unknown(String),
    Empty,
}

pub const HELP: &str = "\
Commands:
  /pause            pause the session
  /resume           resume a paused session
  /end              end the session and exit
  /retry            reconnect after the connection was lost
  /resubmit         send the assessment answers again
  /status           refresh and show progress
  /dismiss          dismiss a break suggestion
  /explain_more /example /skip /question /slower /summary
                    quick actions
  /help             show this help
Anything else is sent to the tutor.";

pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let command = command.split_whitespace().next().unwrap_or_default();
    match command {
        "pause" => Input::Pause,
        "resume" => Input::Resume,
        "end" | "quit" | "exit" => Input::End,
        "retry" => Input::Retry,
        "resubmit" => Input::Resubmit,
        "status" => Input::Status,
        "dismiss" => Input::Dismiss,
        "help" | "?" => Input::Help,
        other => QuickAction::from_id(other)
            .map(Input::Quick)
            .unwrap_or_else(|| Input::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_trimmed_message() {
        assert_eq!(parse("  what is a prime?  "), Input::Say("what is a prime?".into()));
        assert_eq!(parse("   "), Input::Empty);
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(parse("/pause"), Input::Pause);
        assert_eq!(parse("/quit"), Input::End);
        assert_eq!(parse("/skip"), Input::Quick(QuickAction::Skip));
        assert_eq!(parse("/explain_more please"), Input::Quick(QuickAction::ExplainMore));
        assert_eq!(parse("/dance"), Input::Unknown("dance".into()));
    }
}
