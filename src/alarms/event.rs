//! Status events emitted along an alarm's lifecycle.
//!
//! Every successful insert, change, dispatch, announcement and removal is
//! described by an [`AlarmEvent`]. Its [`Display`](std::fmt::Display)
//! implementation renders the human readable status line.

use std::fmt;

use chrono::{DateTime, Local};

use crate::alarms::{
    alarm::{AlarmId, AlarmRecord},
    alarm_store::Scheduled,
};

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Clone, Debug, PartialEq)]
pub enum AlarmEvent {
    /// A new alarm entered the pending store.
    Inserted {
        id: AlarmId,
        expires_on: DateTime<Local>,
        message: String,
    },
    /// A pending alarm got a new duration and message.
    Changed {
        id: AlarmId,
        expires_on: DateTime<Local>,
        message: String,
    },
    /// The scheduler moved an alarm into a worker slot.
    Dispatched {
        id: AlarmId,
        slot: usize,
        expires_on: DateTime<Local>,
        message: String,
    },
    /// Periodic reminder from the worker holding the alarm.
    Announced {
        id: AlarmId,
        slot: usize,
        at: DateTime<Local>,
        message: String,
    },
    /// The alarm expired and its worker released it.
    Removed {
        id: AlarmId,
        slot: usize,
        at: DateTime<Local>,
        message: String,
    },
}

impl AlarmEvent {
    pub fn inserted(id: AlarmId, scheduled: &Scheduled, message: &str) -> Self {
        AlarmEvent::Inserted {
            id,
            expires_on: scheduled.expires_on,
            message: message.to_owned(),
        }
    }

    pub fn changed(id: AlarmId, scheduled: &Scheduled, message: &str) -> Self {
        AlarmEvent::Changed {
            id,
            expires_on: scheduled.expires_on,
            message: message.to_owned(),
        }
    }

    pub fn dispatched(slot: usize, alarm: &AlarmRecord) -> Self {
        AlarmEvent::Dispatched {
            id: alarm.id,
            slot,
            expires_on: alarm.expires_on,
            message: alarm.message.clone(),
        }
    }

    pub fn announced(slot: usize, alarm: &AlarmRecord) -> Self {
        AlarmEvent::Announced {
            id: alarm.id,
            slot,
            at: Local::now(),
            message: alarm.message.clone(),
        }
    }

    pub fn removed(slot: usize, alarm: &AlarmRecord) -> Self {
        AlarmEvent::Removed {
            id: alarm.id,
            slot,
            at: Local::now(),
            message: alarm.message.clone(),
        }
    }

    /// Id of the alarm this event is about.
    pub fn alarm_id(&self) -> AlarmId {
        match self {
            AlarmEvent::Inserted { id, .. }
            | AlarmEvent::Changed { id, .. }
            | AlarmEvent::Dispatched { id, .. }
            | AlarmEvent::Announced { id, .. }
            | AlarmEvent::Removed { id, .. } => *id,
        }
    }
}

impl fmt::Display for AlarmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmEvent::Inserted {
                id,
                expires_on,
                message,
            } => write!(
                f,
                "Alarm({}) inserted, expires at {}: \"{}\"",
                id,
                expires_on.format(TIME_FORMAT),
                message
            ),
            AlarmEvent::Changed {
                id,
                expires_on,
                message,
            } => write!(
                f,
                "Alarm({}) changed, expires at {}: \"{}\"",
                id,
                expires_on.format(TIME_FORMAT),
                message
            ),
            AlarmEvent::Dispatched {
                id,
                slot,
                expires_on,
                message,
            } => write!(
                f,
                "Alarm({}) assigned to worker #{}, expires at {}: \"{}\"",
                id,
                slot,
                expires_on.format(TIME_FORMAT),
                message
            ),
            AlarmEvent::Announced {
                id,
                slot,
                at,
                message,
            } => write!(
                f,
                "Alarm({}) printed by worker #{} at {}: \"{}\"",
                id,
                slot,
                at.format(TIME_FORMAT),
                message
            ),
            AlarmEvent::Removed {
                id,
                slot,
                at,
                message,
            } => write!(
                f,
                "Alarm({}) removed by worker #{} at {}: \"{}\"",
                id,
                slot,
                at.format(TIME_FORMAT),
                message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_dispatched_line_names_worker_and_message() {
        let alarm = AlarmRecord::new(12, 5, "stand up".to_string(), Instant::now(), 0);
        let line = AlarmEvent::dispatched(2, &alarm).to_string();

        assert!(line.starts_with("Alarm(12) assigned to worker #2"));
        assert!(line.ends_with("\"stand up\""));
    }

    #[test]
    fn test_inserted_line_shows_wall_clock_expiration() {
        let alarm = AlarmRecord::new(1, 10, "A".to_string(), Instant::now(), 0);
        let scheduled = Scheduled::from(&alarm);

        let line = AlarmEvent::inserted(1, &scheduled, "A").to_string();
        assert_eq!(
            line,
            format!(
                "Alarm(1) inserted, expires at {}: \"A\"",
                alarm.expires_on.format("%H:%M:%S")
            )
        );
    }

    #[test]
    fn test_removed_line() {
        let alarm = AlarmRecord::new(3, 0, "done".to_string(), Instant::now(), 0);
        let event = AlarmEvent::removed(1, &alarm);

        assert_eq!(event.alarm_id(), 3);
        assert!(event.to_string().starts_with("Alarm(3) removed by worker #1 at "));
    }

    #[test]
    fn test_changed_line_uses_new_message() {
        let mut alarm = AlarmRecord::new(5, 5, "old".to_string(), Instant::now(), 0);
        alarm.reset(9, "new".to_string(), Instant::now(), 1);

        let line = AlarmEvent::changed(alarm.id, &Scheduled::from(&alarm), &alarm.message).to_string();
        assert!(line.contains("Alarm(5) changed"));
        assert!(line.contains("\"new\""));
    }
}
