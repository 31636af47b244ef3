//! Command parsing.
//!
//! This module converts one input line into a structured [`Command`]. Only
//! two shapes are recognized:
//!
//! ```text
//! Start(<id>) <seconds> <message>
//! Change(<id>) <seconds> <message>
//! ```

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::{
    alarms::AlarmId,
    commands::responses::format_bad_command,
};

static COMMAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Start|Change)\(\s*([+-]?\d+)\)\s*([+-]?\d+)\s+(\S.*)$")
        .expect("command pattern is a valid regex")
});

/// Represents a parsed alarm command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Insert a new alarm
    Start {
        id: AlarmId,
        seconds: i32,
        message: String,
    },
    /// Update the duration and message of a pending alarm
    Change {
        id: AlarmId,
        seconds: i32,
        message: String,
    },
}

/// Errors that can occur during command parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandParsingError {
    /// Empty or whitespace-only line
    Blank,
    /// The line does not match any command shape
    Malformed,
}

impl Command {
    /// Parses one input line into a Command.
    ///
    /// The message is the rest of the line and is cut to `max_message_len`
    /// characters. `id` and `seconds` must fit in 32-bit signed integers.
    ///
    /// # Examples
    ///
    /// ```
    /// # use alarmd::commands::command::Command;
    /// let command = Command::parse("Start(4) 10 tea is ready", 128).unwrap();
    /// assert_eq!(
    ///     command,
    ///     Command::Start { id: 4, seconds: 10, message: "tea is ready".to_string() }
    /// );
    /// ```
    pub fn parse(line: &str, max_message_len: usize) -> Result<Self, CommandParsingError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(CommandParsingError::Blank);
        }

        let Some(captures) = COMMAND_PATTERN.captures(line) else {
            debug!("no command shape matches {:?}", line);
            return Err(CommandParsingError::Malformed);
        };

        let id = captures[2]
            .parse::<AlarmId>()
            .map_err(|_| CommandParsingError::Malformed)?;
        let seconds = captures[3]
            .parse::<i32>()
            .map_err(|_| CommandParsingError::Malformed)?;
        let message = truncate(&captures[4], max_message_len);

        match &captures[1] {
            "Start" => Ok(Command::Start {
                id,
                seconds,
                message,
            }),
            "Change" => Ok(Command::Change {
                id,
                seconds,
                message,
            }),
            _ => Err(CommandParsingError::Malformed),
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((end, _)) => {
            debug!("message cut to {} characters", max_chars);
            message[..end].to_owned()
        }
        None => message.to_owned(),
    }
}

/// Formats a parsing error into a user-facing line.
///
/// Blank lines are ignored and produce no message.
pub fn format_command_error(error: CommandParsingError) -> Option<String> {
    match error {
        CommandParsingError::Malformed => Some(format_bad_command()),
        CommandParsingError::Blank => None,
    }
}
