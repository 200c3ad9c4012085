//! Command-line arguments.

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Live tutoring sessions in the terminal
#[derive(Parser, Debug)]
#[command(name = "tutor", version, long_about = None)]
pub struct Cli {
    /// Base URL of the tutor API (overrides $TUTOR_API_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Create a new session and print its id
    Create {
        #[arg(long)]
        board: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        chapter: String,
        /// Optional focus within the chapter
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        course_id: Option<String>,
        /// Join the session right after creating it
        #[arg(long)]
        join: bool,
    },

    /// Join an existing session
    Join {
        session_id: Uuid,
        /// Do not load the conversation history first
        #[arg(long)]
        no_history: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_join() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["tutor", "join", &id.to_string(), "--no-history"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Join {
                session_id: id,
                no_history: true
            }
        );
        assert!(cli.base_url.is_none());
    }

    #[test]
    fn test_rejects_malformed_session_id() {
        assert!(Cli::try_parse_from(["tutor", "join", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_parses_create_with_global_base_url() {
        let cli = Cli::try_parse_from([
            "tutor",
            "create",
            "--board",
            "CBSE",
            "--subject",
            "MATH",
            "--chapter",
            "CH1",
            "--join",
            "--base-url",
            "http://127.0.0.1:9000/api",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://127.0.0.1:9000/api"));
        match cli.command {
            Commands::Create { board, join, topic, .. } => {
                assert_eq!(board, "CBSE");
                assert!(join);
                assert!(topic.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
