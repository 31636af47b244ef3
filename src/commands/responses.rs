//! Response lines for rejected or ignored commands.
//!
//! Accepted commands answer with the alarm's own status line, see
//! [`AlarmEvent`](crate::alarms::AlarmEvent).

use crate::alarms::AlarmId;

/// Formats the response to a line matching no command shape.
///
/// # Examples
///
/// ```
/// # use alarmd::commands::responses::format_bad_command;
/// assert_eq!(format_bad_command(), "Bad command");
/// ```
pub fn format_bad_command() -> String {
    "Bad command".to_owned()
}

/// Formats the response to a `Change` naming no pending alarm.
///
/// The alarm may never have existed or may already be in a worker's hands.
pub fn format_unknown_alarm(id: AlarmId) -> String {
    format!("Alarm({}) is not pending, nothing changed", id)
}

/// Formats the response to a `Start` reusing the id of a pending alarm.
pub fn format_duplicate_alarm(id: AlarmId) -> String {
    format!(
        "Alarm({}) is already pending, use Change({}) to modify it",
        id, id
    )
}
