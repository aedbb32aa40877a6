use std::str::FromStr;

use thiserror::Error;

/// Dashboard commands read from stdin, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Refresh,
    Status,
    Show,
    Read(String),
    Delete(String),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`; type `help` for the list")]
    Unknown(String),
    #[error("`{0}` needs a message id")]
    MissingId(&'static str),
}

impl FromStr for ConsoleCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Ok(ConsoleCommand::Show);
        };
        let id = parts.next().map(str::to_string);

        match head.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "help" | "?" => Ok(ConsoleCommand::Help),
            "refresh" | "sync" | "r" => Ok(ConsoleCommand::Refresh),
            "status" => Ok(ConsoleCommand::Status),
            "show" | "ls" | "list" => Ok(ConsoleCommand::Show),
            "read" | "mark" => id.map(ConsoleCommand::Read).ok_or(CommandError::MissingId("read")),
            "delete" | "del" | "trash" => id
                .map(ConsoleCommand::Delete)
                .ok_or(CommandError::MissingId("delete")),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP_TEXT: &str = "\
commands:
  show              list unread messages with their spam verdicts
  refresh           sync the unread mailbox again
  read <id>         mark a message as read
  delete <id>       move a message to the trash
  status            show session and sync state
  quit              sign out and exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!("refresh".parse(), Ok(ConsoleCommand::Refresh));
        assert_eq!("/sync".parse(), Ok(ConsoleCommand::Refresh));
        assert_eq!("READ 18c1".parse(), Ok(ConsoleCommand::Read("18c1".into())));
        assert_eq!("trash  abc ".parse(), Ok(ConsoleCommand::Delete("abc".into())));
        assert_eq!("".parse(), Ok(ConsoleCommand::Show));
        assert_eq!("q".parse(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            "delete".parse::<ConsoleCommand>(),
            Err(CommandError::MissingId("delete"))
        );
        assert_eq!(
            "archive x".parse::<ConsoleCommand>(),
            Err(CommandError::Unknown("archive".into()))
        );
    }
}
