use std::io::Stdout;
use std::process::ExitCode;

use chatstream::command::{Command, HELP_TEXT, Input, parse_input};
use chatstream::{
    ChatSession, ChatSurface, SettingsStore, SubmitOutcome, SubmitRejection, TerminalSurface,
};
use chatstream_transport::{TransportEventStream, TransportHandle, TransportKind, create_transport};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type TerminalSession = ChatSession<TerminalSurface<Stdout>>;

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings_store = SettingsStore::load();
    init_tracing(&settings_store.settings().log_filter);

    match run(settings_store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "chat client stopped");
            eprintln!("chatstream: {error}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so they do
/// not interleave with the transcript.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(settings_store: SettingsStore) -> Result<(), CliError> {
    let settings = settings_store.settings();
    tracing::info!(
        path = ?settings_store.config_path(),
        transport = %settings.transport,
        server_url = %settings.server_url,
        "starting chat client"
    );

    let TransportHandle {
        transport,
        mut events,
    } = create_transport(settings.transport_config());
    let mut session = ChatSession::new(transport, TerminalSurface::new(std::io::stdout()));
    session.show_system_message("Type a message and press enter. /help lists commands.");
    session.connect().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context(ReadInputSnafu { stage: "read-terminal-line" })? else {
                    break;
                };

                match parse_input(&line) {
                    Ok(Input::Message(text)) => submit(&mut session, &text).await,
                    Ok(Input::Command(Command::Quit)) => break,
                    Ok(Input::Command(Command::Use(kind))) => {
                        events = switch_transport(&mut session, &settings_store, kind).await;
                    }
                    Ok(Input::Command(command)) => run_command(&mut session, command).await,
                    Err(error) => session.show_system_message(error.to_string()),
                }
            }
            Some(event) = events.recv() => session.handle_event(event).await,
        }
    }

    session.disconnect().await;
    Ok(())
}

async fn submit(session: &mut TerminalSession, text: &str) {
    match session.submit(text).await {
        SubmitOutcome::Rejected(SubmitRejection::Disconnected) => {
            session.show_system_message("Not connected. Use /connect first.");
        }
        SubmitOutcome::Rejected(SubmitRejection::ResponsePending) => {
            session.show_system_message("Still waiting for the previous response.");
        }
        SubmitOutcome::Sent | SubmitOutcome::Ignored | SubmitOutcome::Failed => {}
    }
}

async fn run_command(session: &mut TerminalSession, command: Command) {
    match command {
        Command::New => session.start_new_conversation(),
        Command::History => {
            if session.is_connected() {
                session.refresh_history().await;
            } else {
                let entries = session.history().list().to_vec();
                session.surface_mut().show_history(&entries);
            }
        }
        Command::Open(id) => session.open_conversation(&id).await,
        Command::Connect => {
            session.connect().await;
        }
        Command::Disconnect => session.disconnect().await,
        Command::Help => session.show_system_message(HELP_TEXT),
        Command::Use(_) | Command::Quit => {}
    }
}

/// Persists the choice, rebuilds the transport, and reconnects. Returns the
/// event stream of the new transport.
async fn switch_transport(
    session: &mut TerminalSession,
    settings_store: &SettingsStore,
    kind: TransportKind,
) -> TransportEventStream {
    let mut settings = (*settings_store.settings()).clone();
    settings.transport = kind;
    if let Err(error) = settings_store.update(settings.clone()) {
        tracing::warn!(error = %error, "failed to persist transport choice");
        session.show_system_message(format!("Could not save settings: {error}"));
    }

    let TransportHandle { transport, events } = create_transport(settings.transport_config());
    session.replace_transport(transport).await;
    session.connect().await;
    events
}
