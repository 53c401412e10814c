use chatstream_transport::TransportKind;
use snafu::{OptionExt, Snafu, ensure};

pub const HELP_TEXT: &str = "\
commands:
  /new               start a new conversation
  /history           refresh the saved-conversation list
  /open <id>         load a saved conversation
  /connect           connect to the chat server
  /disconnect        disconnect from the chat server
  /use <transport>   switch transport (websocket or http)
  /help              show this list
  /quit              exit";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    History,
    Open(String),
    Connect,
    Disconnect,
    Use(TransportKind),
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("`/{command}` needs {argument}"))]
    MissingArgument {
        stage: &'static str,
        command: &'static str,
        argument: &'static str,
    },
    #[snafu(display("{message}"))]
    InvalidTransport { stage: &'static str, message: String },
}

/// Lines starting with `/` are commands; anything else is a chat message.
pub fn parse_input(line: &str) -> Result<Input, CommandError> {
    let trimmed = line.trim();
    let Some(command_line) = trimmed.strip_prefix('/') else {
        return Ok(Input::Message(line.to_string()));
    };

    let (name, argument) = match command_line.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command_line, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "new" => Command::New,
        "history" => Command::History,
        "open" => {
            ensure!(
                !argument.is_empty(),
                MissingArgumentSnafu {
                    stage: "parse-open-command",
                    command: "open",
                    argument: "a conversation id",
                }
            );
            Command::Open(argument.to_string())
        }
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "use" => {
            let raw = Some(argument)
                .filter(|argument| !argument.is_empty())
                .context(MissingArgumentSnafu {
                    stage: "parse-use-command",
                    command: "use",
                    argument: "a transport (websocket or http)",
                })?;
            let kind = raw
                .parse::<TransportKind>()
                .map_err(|message| CommandError::InvalidTransport {
                    stage: "parse-use-command",
                    message,
                })?;
            Command::Use(kind)
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return UnknownCommandSnafu {
                stage: "parse-command",
                name: other.to_string(),
            }
            .fail();
        }
    };

    Ok(Input::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse_input("hello there").unwrap(),
            Input::Message("hello there".to_string())
        );
    }

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(
            parse_input("/open 1700000000000").unwrap(),
            Input::Command(Command::Open("1700000000000".to_string()))
        );
        assert_eq!(
            parse_input("  /use HTTP ").unwrap(),
            Input::Command(Command::Use(TransportKind::Http))
        );
        assert_eq!(parse_input("/new").unwrap(), Input::Command(Command::New));
        assert_eq!(parse_input("/exit").unwrap(), Input::Command(Command::Quit));
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(matches!(
            parse_input("/open"),
            Err(CommandError::MissingArgument { command: "open", .. })
        ));
        assert!(matches!(
            parse_input("/use"),
            Err(CommandError::MissingArgument { command: "use", .. })
        ));
        assert!(matches!(
            parse_input("/use pigeon"),
            Err(CommandError::InvalidTransport { .. })
        ));
        let error = parse_input("/dance").unwrap_err();
        assert_eq!(error.to_string(), "unknown command `/dance`, try /help");
    }
}
