//! Ordered collection of pending alarms.
//!
//! [`PendingAlarms`] keeps alarms sorted by ascending expiration. Ties are
//! broken by ascending id, then by insertion sequence, so the order is total
//! and insertion is deterministic. The collection does no locking of its own:
//! [`AlarmStore`](crate::alarms::AlarmStore) owns it behind its mutex.

use std::time::{Duration, Instant};

use crate::alarms::alarm::{AlarmId, AlarmRecord};

/// Result of [`PendingAlarms::take_earliest_if_due`].
#[derive(Debug)]
pub enum TakeOutcome {
    /// Nothing is pending.
    Empty,
    /// The earliest alarm was due and has been removed; the caller now owns it.
    Due(AlarmRecord),
    /// The earliest alarm expires after the given wait.
    NotDue(Duration),
}

#[derive(Debug, Default)]
pub struct PendingAlarms {
    alarms: Vec<AlarmRecord>,
}

impl PendingAlarms {
    pub fn new() -> Self {
        PendingAlarms { alarms: Vec::new() }
    }

    /// Inserts an alarm at its sorted position.
    ///
    /// Duplicate ids are accepted and coexist as independent records.
    pub fn insert(&mut self, alarm: AlarmRecord) {
        let key = alarm.order_key();
        let position = self.alarms.partition_point(|a| a.order_key() <= key);
        self.alarms.insert(position, alarm);
    }

    /// Rewrites the first alarm matching `id` and moves it to its new position.
    ///
    /// Returns `false` when no pending alarm has this id; nothing is created.
    pub fn update(
        &mut self,
        id: AlarmId,
        seconds: i32,
        message: String,
        now: Instant,
        seq: u64,
    ) -> bool {
        let Some(index) = self.alarms.iter().position(|a| a.id == id) else {
            return false;
        };

        let mut alarm = self.alarms.remove(index);
        alarm.reset(seconds, message, now, seq);
        self.insert(alarm);
        true
    }

    /// Removes and returns the head alarm if it expires at or before `now`.
    pub fn take_earliest_if_due(&mut self, now: Instant) -> TakeOutcome {
        let Some(head) = self.alarms.first() else {
            return TakeOutcome::Empty;
        };

        if head.is_due(now) {
            TakeOutcome::Due(self.alarms.remove(0))
        } else {
            TakeOutcome::NotDue(head.remaining(now))
        }
    }

    pub fn contains(&self, id: AlarmId) -> bool {
        self.alarms.iter().any(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// Iterates in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &AlarmRecord> {
        self.alarms.iter()
    }
}
