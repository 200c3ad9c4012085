//! Main Entrypoint for the Tutor CLI
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Initializing logging (to stderr, so the conversation owns stdout).
//! 3. Creating or joining a session.
//! 4. Running the interactive loop until the session ends or stdin closes.

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tutor_client::{
    AssessmentProgress, ClientError, CreateSessionRequest, TutorApi, TutorSession,
};
use tutor_core::model::Update;
use tutor_service::{
    cli::{Cli, Commands},
    config::Config,
    input::{self, Input},
    render::{self, Renderer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(base_url = %config.api_base_url, "Configuration loaded");

    let api = TutorApi::new(&config.api_base_url).context("Failed to build the HTTP client")?;
    let credentials = config.credential_provider();

    // --- 3. Create or Join ---
    let (session_id, load_history) = match cli.command {
        Commands::Create {
            board,
            subject,
            chapter,
            topic,
            course_id,
            join,
        } => {
            let credential = credentials
                .credential()
                .await
                .context("No credential available")?;
            let request = CreateSessionRequest {
                board,
                subject,
                chapter,
                topic,
                course_id,
            };
            let session_id = api
                .create_session(&request, &credential)
                .await
                .context("Failed to create the session")?;
            println!("{session_id}");
            if !join {
                return Ok(());
            }
            (session_id, false)
        }
        Commands::Join {
            session_id,
            no_history,
        } => (session_id, !no_history),
    };

    let session = TutorSession::new(
        session_id.to_string(),
        api,
        credentials,
        config.session_options(load_history),
    );

    // --- 4. Interactive Loop ---
    run(session).await
}

async fn run(mut session: TutorSession) -> anyhow::Result<()> {
    let mut renderer = Renderer::new();
    let joined = session.join().await;
    print_lines(renderer.history(session.model()));
    match joined {
        Ok(()) => println!("Connected. Type /help for commands."),
        Err(e) => report(&e),
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = session.next_update(), if session.is_streaming() => match update {
                Some(Ok(update)) => print_lines(renderer.update(session.model(), &update)),
                Some(Err(e)) => report(&e),
                None => debug!(connection = ?session.connection(), "Session stream idle"),
            },
            line = stdin.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    info!("Input closed");
                    break;
                };
                if !handle_input(&mut session, &mut renderer, input::parse(&line)).await {
                    break;
                }
            }
        }

        if session.model().state().is_finished() {
            break;
        }
    }

    let exit = session.end().await;
    if let Some(summary) = exit.summary {
        println!("Session summary:\n{}", serde_json::to_string_pretty(&summary)?);
    }
    info!(session_id = %exit.session_id, messages = exit.transcript.len(), "Session closed");
    Ok(())
}

/// Returns `false` when the student asked to leave.
async fn handle_input(session: &mut TutorSession, renderer: &mut Renderer, command: Input) -> bool {
    let result = match command {
        Input::Empty => Ok(Vec::new()),
        Input::Help => {
            println!("{}", input::HELP);
            Ok(Vec::new())
        }
        Input::End => return false,
        Input::Say(text) if session.model().assessment().is_gating() => {
            session.answer_assessment(&text).await.map(|progress| match progress {
                AssessmentProgress::Next => Vec::new(),
                AssessmentProgress::Submitted(updates) => updates,
            })
        }
        Input::Resubmit => session
            .retry_assessment_submission()
            .await
            .map(|progress| match progress {
                AssessmentProgress::Next => Vec::new(),
                AssessmentProgress::Submitted(updates) => updates,
            }),
        Input::Say(text) => session.send_message(&text).await,
        Input::Quick(action) => session
            .quick_action(action.id())
            .await
            .map(Option::unwrap_or_default),
        Input::Pause => session.pause().await.map(|()| {
            println!("Paused. Type /resume to continue.");
            Vec::new()
        }),
        Input::Resume => session.resume().await,
        Input::Retry => session.retry().await,
        Input::Status => {
            let updates = match session.resync().await {
                Ok(updates) => updates,
                Err(e) => {
                    report(&e);
                    Vec::new()
                }
            };
            println!("{}", render::status(session.model(), session.connection()));
            Ok(updates)
        }
        Input::Dismiss => {
            session.dismiss_break_suggestion();
            Ok(Vec::new())
        }
        Input::Unknown(command) => {
            println!("Unknown command /{command}. Type /help for commands.");
            Ok(Vec::new())
        }
    };

    match result {
        Ok(updates) => print_updates(renderer, session, &updates),
        Err(e) => report(&e),
    }
    print_lines(renderer.refresh(session.model()));
    true
}

fn print_updates(renderer: &mut Renderer, session: &TutorSession, updates: &[Update]) {
    for update in updates {
        print_lines(renderer.update(session.model(), update));
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn report(error: &ClientError) {
    let hint = match error {
        ClientError::ReconnectExhausted { .. } | ClientError::Credential(_) => " (type /retry)",
        ClientError::Busy => " (wait for the tutor to finish)",
        ClientError::Http { .. } | ClientError::Stream(_) if error.is_retryable() => {
            " (type /retry)"
        }
        ClientError::SendFailed(_) => " (send it again)",
        _ => "",
    };
    println!("error: {error}{hint}");
}
