//! Parsing of stdin lines into user intents.

use thiserror::Error;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/create`
    Create,
    /// `/join <room>`
    Join(String),
    /// `/leave`
    Leave,
    /// `/reconnect`
    Reconnect,
    /// `/nick <name> [icon]`
    Nick {
        /// New nickname
        nickname: String,
        /// New icon, if given
        icon: Option<String>,
    },
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Anything that is not a command
    Say(String),
    /// A blank line
    Empty,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line started with `/` but named no known command.
    #[error("unknown command /{0}, try /help")]
    UnknownCommand(String),

    /// A command is missing its argument.
    #[error("usage: {0}")]
    MissingArgument(&'static str),
}

/// Help text listing every command.
pub const HELP: &str = "\
/create              create a room and join it
/join <room>         join an existing room
/leave               leave the current room
/reconnect           reconnect now
/nick <name> [icon]  set the nickname and icon used for rooms
/quit                leave and exit
anything else is sent to the room";

impl Command {
    /// Parse one input line.
    ///
    /// A line starting with `//` sends the rest, starting with `/`, as a
    /// message.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Self::Empty);
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Self::Say(line.to_string()));
        };
        if rest.starts_with('/') {
            return Ok(Self::Say(rest.to_string()));
        }

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();

        match name {
            "create" => Ok(Self::Create),
            "join" => words
                .next()
                .map(|room| Self::Join(room.to_string()))
                .ok_or(ParseError::MissingArgument("/join <room>")),
            "leave" => Ok(Self::Leave),
            "reconnect" => Ok(Self::Reconnect),
            "nick" => {
                let nickname =
                    words.next().ok_or(ParseError::MissingArgument("/nick <name> [icon]"))?;
                Ok(Self::Nick {
                    nickname: nickname.to_string(),
                    icon: words.next().map(str::to_string),
                })
            },
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/create"), Ok(Command::Create));
        assert_eq!(Command::parse("  /join room-3  "), Ok(Command::Join("room-3".to_string())));
        assert_eq!(Command::parse("/leave"), Ok(Command::Leave));
        assert_eq!(Command::parse("/reconnect"), Ok(Command::Reconnect));
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
        assert_eq!(Command::parse("/help"), Ok(Command::Help));
    }

    #[test]
    fn nick_takes_an_optional_icon() {
        assert_eq!(
            Command::parse("/nick alice"),
            Ok(Command::Nick { nickname: "alice".to_string(), icon: None })
        );
        assert_eq!(
            Command::parse("/nick alice 🦊"),
            Ok(Command::Nick { nickname: "alice".to_string(), icon: Some("🦊".to_string()) })
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        assert_eq!(Command::parse("/join"), Err(ParseError::MissingArgument("/join <room>")));
        assert!(matches!(Command::parse("/nick"), Err(ParseError::MissingArgument(_))));
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            Command::parse("/dance now"),
            Err(ParseError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn plain_text_is_kept_verbatim() {
        assert_eq!(Command::parse("  hi there "), Ok(Command::Say("  hi there ".to_string())));
        assert_eq!(
            Command::parse("//join is a command"),
            Ok(Command::Say("/join is a command".to_string()))
        );
        assert_eq!(Command::parse("   "), Ok(Command::Empty));
    }

    proptest! {
        #[test]
        fn prop_lines_without_slash_are_messages(line in "[^/\\s][^\n]{0,40}") {
            prop_assert_eq!(Command::parse(&line), Ok(Command::Say(line.clone())));
        }
    }
}
