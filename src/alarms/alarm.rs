//! Alarm records and their lifecycle states.
//!
//! This module provides the [`AlarmRecord`] struct carried from the command
//! port, through the pending store, to exactly one worker slot.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeDelta};

/// Caller supplied alarm identifier.
///
/// Unique among pending alarms only. Two alarms with the same id may coexist
/// once one of them has been dispatched to a worker.
pub type AlarmId = i32;

/// A single pending or in-flight alarm.
///
/// The record is moved, never shared: it lives in the pending store until
/// the scheduler hands it to a worker slot, and the worker drops it once the
/// expiration instant has passed.
#[derive(Clone, Debug)]
pub struct AlarmRecord {
    /// Caller supplied identifier.
    pub id: AlarmId,
    /// Requested delay in seconds, as last set by an insert or an update.
    pub requested_duration: i32,
    /// Monotonic expiration instant, used for ordering and waiting.
    pub expires_at: Instant,
    /// Wall-clock expiration, used when rendering status lines.
    pub expires_on: DateTime<Local>,
    /// Text payload.
    pub message: String,
    /// Insertion sequence number, last tie-break of the pending order.
    pub(crate) seq: u64,
}

impl AlarmRecord {
    /// Creates a record expiring `seconds` after `now`.
    ///
    /// Zero or negative durations produce an alarm that is already due.
    pub fn new(id: AlarmId, seconds: i32, message: String, now: Instant, seq: u64) -> Self {
        let expires_at = deadline_after(now, seconds);
        AlarmRecord {
            id,
            requested_duration: seconds,
            expires_at,
            expires_on: wall_clock_of(expires_at),
            message,
            seq,
        }
    }

    /// Overwrites the duration and message, recomputing both deadlines from `now`.
    pub(crate) fn reset(&mut self, seconds: i32, message: String, now: Instant, seq: u64) {
        self.requested_duration = seconds;
        self.expires_at = deadline_after(now, seconds);
        self.expires_on = wall_clock_of(self.expires_at);
        self.message = message;
        self.seq = seq;
    }

    /// Returns `true` once `now` has reached the expiration instant.
    pub fn is_due(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Time left until expiration, zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Sort key of the pending order: expiration, then id, then insertion sequence.
    pub(crate) fn order_key(&self) -> (Instant, AlarmId, u64) {
        (self.expires_at, self.id, self.seq)
    }
}

/// Lifecycle position of a live alarm.
///
/// Completed alarms have been dropped by their worker and no longer appear
/// anywhere, so they have no variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmStatus {
    /// Held by the store, still updatable.
    Pending,
    /// Handed to a worker slot, no longer visible to updates.
    Dispatched,
}

/// Read-only view of an alarm used for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlarmView {
    pub id: AlarmId,
    pub status: AlarmStatus,
    /// Worker slot holding the alarm, `None` while pending.
    pub slot: Option<usize>,
    pub remaining_secs: u64,
}

fn deadline_after(now: Instant, seconds: i32) -> Instant {
    match u64::try_from(seconds) {
        Ok(secs) => now + Duration::from_secs(secs),
        Err(_) => now,
    }
}

/// Wall-clock time of a monotonic deadline. Past deadlines map to the current time.
fn wall_clock_of(deadline: Instant) -> DateTime<Local> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    Local::now() + TimeDelta::from_std(remaining).unwrap_or(TimeDelta::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_computes_deadline_from_now() {
        let now = Instant::now();
        let alarm = AlarmRecord::new(7, 30, "coffee".to_string(), now, 0);

        assert_eq!(alarm.expires_at, now + Duration::from_secs(30));
        assert_eq!(alarm.requested_duration, 30);
        assert!(!alarm.is_due(now));
        assert!(alarm.is_due(now + Duration::from_secs(30)));
    }

    #[test]
    fn test_negative_duration_is_due_immediately() {
        let now = Instant::now();
        let alarm = AlarmRecord::new(1, -5, "late".to_string(), now, 0);

        assert!(alarm.is_due(now));
        assert_eq!(alarm.remaining(now), Duration::ZERO);
    }

    #[test]
    fn test_negative_duration_expires_on_creation_time() {
        let before = Local::now();
        let alarm = AlarmRecord::new(1, -3600, "late".to_string(), Instant::now(), 0);
        let after = Local::now();

        assert!(alarm.expires_on >= before);
        assert!(alarm.expires_on <= after);
    }

    #[test]
    fn test_wall_clock_expiration_follows_deadline() {
        let before = Local::now();
        let alarm = AlarmRecord::new(1, 30, "A".to_string(), Instant::now(), 0);
        let after = Local::now();

        assert!(alarm.expires_on >= before + TimeDelta::seconds(29));
        assert!(alarm.expires_on <= after + TimeDelta::seconds(30));
    }

    #[test]
    fn test_reset_recomputes_from_new_instant() {
        let start = Instant::now();
        let mut alarm = AlarmRecord::new(1, 10, "A".to_string(), start, 0);

        let later = start + Duration::from_secs(4);
        alarm.reset(1, "A2".to_string(), later, 3);

        assert_eq!(alarm.expires_at, later + Duration::from_secs(1));
        assert_eq!(alarm.message, "A2");
        assert_eq!(alarm.requested_duration, 1);
        assert_eq!(alarm.seq, 3);
    }

    #[test]
    fn test_remaining_counts_down() {
        let now = Instant::now();
        let alarm = AlarmRecord::new(1, 10, "A".to_string(), now, 0);

        assert_eq!(
            alarm.remaining(now + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
    }
}
