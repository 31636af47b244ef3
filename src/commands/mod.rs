//! Console command parsing and execution.
//!
//! This module is the command port of the scheduler: it turns input lines
//! into alarm store operations.
//!
//! # Architecture
//!
//! ```text
//! input line
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Commander  │  ← Entry point: parse() + execute()
//! └─────────────┘
//!      │
//!      ├── parse() ─────────► command::Command
//!      │
//!      └── execute() ───────► AlarmStore insert / update
//!                                     │
//!                                     ▼
//!                          ┌────────────────────┐
//!                          │  CommandResult     │
//!                          │  - response line   │
//!                          │  - accepted flag   │
//!                          └────────────────────┘
//! ```
//!
//! # Command Structure
//!
//! | Command | Effect |
//! |---------|--------|
//! | `Start(<id>) <seconds> <message>` | Insert a new pending alarm |
//! | `Change(<id>) <seconds> <message>` | Rewrite a pending alarm, expiration counted from now |
//!
//! # Error Handling
//!
//! - **Silent Errors** ([`CommandParseError::Ignored`]): blank lines. No
//!   response is produced.
//! - **User Errors** ([`CommandParseError::InvalidCommand`]): lines matching
//!   no command shape. The error carries the line to show the user.
//!
//! A command that parses but cannot be applied, such as a `Change` naming no
//! pending alarm, is not an error: it yields a [`CommandResult`] with
//! `accepted` set to `false`.

pub mod command;
mod commander;
pub mod responses;

pub use crate::commands::commander::Commander;

/// Result of command execution.
///
/// # Examples
///
/// ```
/// # use alarmd::commands::CommandResult;
/// let result = CommandResult {
///     response: "Alarm(5) is not pending, nothing changed".to_string(),
///     accepted: false,
/// };
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct CommandResult {
    /// Line to show the user
    pub response: String,
    /// Whether the store was modified
    pub accepted: bool,
}

/// Errors that can occur during command parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandParseError {
    /// Blank line (silent error)
    Ignored,
    /// Invalid command syntax with error message
    InvalidCommand(String),
}
