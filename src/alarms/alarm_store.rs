//! Shared alarm store guarded by a single mutex.
//!
//! This module provides the [`AlarmStore`], the one synchronization domain of
//! the scheduler. Its mutex protects both the pending alarms and the worker
//! slot table, so taking an alarm and assigning it to an idle slot happen in
//! one critical section. Two kinds of condition variables hang off the same
//! mutex:
//!
//! - `changed` wakes the scheduler when an alarm is inserted or updated, when
//!   a slot is released, or when the store is closed
//! - one signal per worker slot wakes the worker an alarm was assigned to
//!
//! The lock is held for structural mutations only. No method logs, prints or
//! sleeps while holding the guard; condition variable waits release it
//! atomically.

use std::{
    io, process,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use log::{error, info};
use thiserror::Error;

use crate::alarms::{
    alarm::{AlarmId, AlarmRecord, AlarmStatus, AlarmView},
    event::AlarmEvent,
    pending::{PendingAlarms, TakeOutcome},
    worker_pool::{SlotState, SlotTable},
};

/// Fatal failures of the synchronization machinery.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// A thread panicked while holding the store lock.
    #[error("alarm store lock poisoned")]
    Poisoned,
    /// A worker slot index outside the pool was used.
    #[error("unknown worker slot {0}")]
    UnknownSlot(usize),
    /// The operating system refused to start a thread.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Terminates the process when a scheduler or worker thread hits a fatal error.
pub(crate) fn exit_on_error(role: &str, result: Result<(), AlarmError>) {
    if let Err(e) = result {
        error!("{} thread failed: {}", role, e);
        process::exit(1);
    }
}

/// Deadlines computed by an accepted insert or update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scheduled {
    pub expires_at: Instant,
    pub expires_on: DateTime<Local>,
}

impl From<&AlarmRecord> for Scheduled {
    fn from(alarm: &AlarmRecord) -> Self {
        Scheduled {
            expires_at: alarm.expires_at,
            expires_on: alarm.expires_on,
        }
    }
}

/// Outcome of one dispatch step.
#[derive(Debug)]
pub enum Dispatch {
    /// The earliest due alarm went to a worker slot.
    Assigned(AlarmEvent),
    /// Every slot is busy; due alarms stay pending and updatable.
    Saturated,
    /// Nothing is pending.
    Idle,
    /// The earliest alarm becomes due after the given wait.
    NotDue(Duration),
    /// The store was closed, nothing is dispatched anymore.
    Closed,
}

/// State behind the store mutex.
#[derive(Debug)]
pub(crate) struct Ledger {
    pub(crate) pending: PendingAlarms,
    pub(crate) slots: SlotTable,
    pub(crate) closed: bool,
    next_seq: u64,
    /// Bumped on every change the scheduler must react to.
    changes: u64,
}

impl Ledger {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    fn mark_changed(&mut self) {
        self.changes = self.changes.wrapping_add(1);
    }

    fn insert(&mut self, id: AlarmId, seconds: i32, message: String, now: Instant) -> Scheduled {
        let seq = self.next_seq();
        let alarm = AlarmRecord::new(id, seconds, message, now, seq);
        let scheduled = Scheduled::from(&alarm);
        self.pending.insert(alarm);
        self.mark_changed();
        scheduled
    }

    fn update(
        &mut self,
        id: AlarmId,
        seconds: i32,
        message: String,
        now: Instant,
    ) -> Option<Scheduled> {
        let seq = self.next_seq();
        if !self.pending.update(id, seconds, message, now, seq) {
            return None;
        }
        self.mark_changed();
        self.pending
            .iter()
            .find(|a| a.id == id && a.seq == seq)
            .map(Scheduled::from)
    }

    /// Takes the earliest alarm due by `due_by` and hands it to the next idle slot.
    ///
    /// Nothing is taken while every slot is busy.
    fn dispatch_earliest_if_due(&mut self, due_by: Instant) -> (Dispatch, Option<usize>) {
        if self.closed {
            return (Dispatch::Closed, None);
        }
        let Some(slot) = self.slots.next_idle() else {
            return (Dispatch::Saturated, None);
        };

        let alarm = match self.pending.take_earliest_if_due(due_by) {
            TakeOutcome::Empty => return (Dispatch::Idle, None),
            TakeOutcome::NotDue(wait) => return (Dispatch::NotDue(wait), None),
            TakeOutcome::Due(alarm) => alarm,
        };

        let event = AlarmEvent::dispatched(slot, &alarm);
        match self.slots.assign(slot, alarm) {
            Ok(()) => (Dispatch::Assigned(event), Some(slot)),
            Err(alarm) => {
                self.pending.insert(alarm);
                (Dispatch::Saturated, None)
            }
        }
    }
}

/// Authoritative holder of every pending alarm.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Instant;
/// # use alarmd::alarms::AlarmStore;
/// let store = AlarmStore::new(3);
/// store.insert(1, 10, "A".to_string())?;
/// store.insert(2, 3, "B".to_string())?;
///
/// // Alarm 2 expires first, so it is listed first
/// let views = store.snapshot(Instant::now())?;
/// assert_eq!(views[0].id, 2);
/// # Ok::<(), alarmd::alarms::AlarmError>(())
/// ```
#[derive(Debug)]
pub struct AlarmStore {
    ledger: Mutex<Ledger>,
    changed: Condvar,
    slot_signals: Vec<Condvar>,
}

impl AlarmStore {
    /// Creates an empty store coordinating `slot_count` worker slots.
    pub fn new(slot_count: usize) -> Self {
        AlarmStore {
            ledger: Mutex::new(Ledger {
                pending: PendingAlarms::new(),
                slots: SlotTable::new(slot_count),
                closed: false,
                next_seq: 0,
                changes: 0,
            }),
            changed: Condvar::new(),
            slot_signals: (0..slot_count).map(|_| Condvar::new()).collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_signals.len()
    }

    /// Inserts a new pending alarm expiring `seconds` from now.
    ///
    /// Never rejects an alarm: a duplicate id becomes an independent record.
    pub fn insert(&self, id: AlarmId, seconds: i32, message: String) -> Result<Scheduled, AlarmError> {
        self.insert_at(Instant::now(), id, seconds, message)
    }

    pub(crate) fn insert_at(
        &self,
        now: Instant,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<Scheduled, AlarmError> {
        let scheduled = self.lock()?.insert(id, seconds, message, now);
        self.changed.notify_all();
        Ok(scheduled)
    }

    /// Inserts a new pending alarm unless one with the same id is pending.
    ///
    /// The check and the insert share one critical section. Returns `None`
    /// when the id is already pending.
    pub fn insert_if_absent(
        &self,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<Option<Scheduled>, AlarmError> {
        let mut ledger = self.lock()?;
        if ledger.pending.contains(id) {
            return Ok(None);
        }
        let scheduled = ledger.insert(id, seconds, message, Instant::now());
        drop(ledger);

        self.changed.notify_all();
        Ok(Some(scheduled))
    }

    /// Rewrites the pending alarm with this id, recomputing its expiration from now.
    ///
    /// Returns `None` when no pending alarm matches, including alarms that
    /// were already dispatched to a worker.
    pub fn update(
        &self,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<Option<Scheduled>, AlarmError> {
        self.update_at(Instant::now(), id, seconds, message)
    }

    pub(crate) fn update_at(
        &self,
        now: Instant,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<Option<Scheduled>, AlarmError> {
        let scheduled = self.lock()?.update(id, seconds, message, now);
        if scheduled.is_some() {
            self.changed.notify_all();
        }
        Ok(scheduled)
    }

    /// Removes the earliest alarm expiring at or before `due_by` and assigns
    /// it to the next idle worker slot.
    ///
    /// The take and the assignment happen in one critical section, so an
    /// alarm is either pending or owned by exactly one slot. The assigned
    /// worker is signalled once the lock is released.
    pub fn dispatch_earliest_if_due(&self, due_by: Instant) -> Result<Dispatch, AlarmError> {
        let (dispatch, slot) = self.lock()?.dispatch_earliest_if_due(due_by);
        if let Some(slot) = slot {
            self.signal_slot(slot);
        }
        Ok(dispatch)
    }

    /// Lists pending alarms in dispatch order, followed by busy worker slots.
    pub fn snapshot(&self, now: Instant) -> Result<Vec<AlarmView>, AlarmError> {
        let ledger = self.lock()?;

        let pending = ledger.pending.iter().map(|alarm| AlarmView {
            id: alarm.id,
            status: AlarmStatus::Pending,
            slot: None,
            remaining_secs: alarm.remaining(now).as_secs(),
        });

        let dispatched = ledger
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, state)| match state {
                SlotState::Idle => None,
                SlotState::Assigned(alarm) => Some((slot, alarm.id, alarm.expires_at)),
                SlotState::Running { id, expires_at } => Some((slot, *id, *expires_at)),
            })
            .map(|(slot, id, expires_at)| AlarmView {
                id,
                status: AlarmStatus::Dispatched,
                slot: Some(slot),
                remaining_secs: expires_at.saturating_duration_since(now).as_secs(),
            });

        Ok(pending.chain(dispatched).collect())
    }

    /// Stops the scheduler and idle workers.
    ///
    /// Pending alarms and alarms being announced are discarded, not drained.
    pub fn close(&self) -> Result<(), AlarmError> {
        let mut ledger = self.lock()?;
        if ledger.closed {
            return Ok(());
        }
        ledger.closed = true;
        ledger.mark_changed();
        let discarded = (!ledger.pending.is_empty()).then(|| ledger.pending.len());
        drop(ledger);

        if let Some(count) = discarded {
            info!("discarding {} pending alarms", count);
        }
        info!("alarm store closed");
        self.changed.notify_all();
        self.slot_signals.iter().for_each(Condvar::notify_all);
        Ok(())
    }

    pub fn is_closed(&self) -> Result<bool, AlarmError> {
        Ok(self.lock()?.closed)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Ledger>, AlarmError> {
        self.ledger.lock().map_err(|_| AlarmError::Poisoned)
    }

    /// Counter of changes seen so far, to be passed to [`Self::wait_for_change`].
    pub(crate) fn change_count(&self) -> Result<u64, AlarmError> {
        Ok(self.lock()?.changes)
    }

    /// Blocks until a change newer than `seen` happens, the store is closed,
    /// or `timeout` elapses.
    ///
    /// A change made between reading `seen` and calling this returns at once.
    pub(crate) fn wait_for_change(&self, seen: u64, timeout: Duration) -> Result<(), AlarmError> {
        let ledger = self.lock()?;
        self.changed
            .wait_timeout_while(ledger, timeout, |ledger| {
                ledger.changes == seen && !ledger.closed
            })
            .map(drop)
            .map_err(|_| AlarmError::Poisoned)
    }

    /// Releases the lock until the scheduler signals `slot`.
    pub(crate) fn wait_for_assignment<'a>(
        &self,
        slot: usize,
        ledger: MutexGuard<'a, Ledger>,
    ) -> Result<MutexGuard<'a, Ledger>, AlarmError> {
        let signal = self
            .slot_signals
            .get(slot)
            .ok_or(AlarmError::UnknownSlot(slot))?;
        signal.wait(ledger).map_err(|_| AlarmError::Poisoned)
    }

    /// Sleeps on the slot signal for the whole of `timeout` unless the store
    /// is closed first. Wake-ups before the deadline go back to sleep.
    ///
    /// Returns `false` when the store is closed.
    pub(crate) fn pause_unless_closed(
        &self,
        slot: usize,
        timeout: Duration,
    ) -> Result<bool, AlarmError> {
        let signal = self
            .slot_signals
            .get(slot)
            .ok_or(AlarmError::UnknownSlot(slot))?;
        let ledger = self.lock()?;
        let (ledger, _) = signal
            .wait_timeout_while(ledger, timeout, |ledger| !ledger.closed)
            .map_err(|_| AlarmError::Poisoned)?;
        Ok(!ledger.closed)
    }

    /// Marks `slot` idle again and wakes the scheduler.
    pub(crate) fn release_slot(&self, slot: usize) -> Result<(), AlarmError> {
        let mut ledger = self.lock()?;
        ledger.slots.release(slot);
        ledger.mark_changed();
        drop(ledger);

        self.changed.notify_all();
        Ok(())
    }

    pub(crate) fn signal_slot(&self, slot: usize) {
        if let Some(signal) = self.slot_signals.get(slot) {
            signal.notify_one();
        }
    }
}


#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use serial_test::serial;

    use super::{testing::audit_logging, *};

    fn assigned(dispatch: Dispatch) -> (AlarmId, usize, String) {
        match dispatch {
            Dispatch::Assigned(AlarmEvent::Dispatched {
                id, slot, message, ..
            }) => (id, slot, message),
            other => panic!("expected an assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_returns_expiration() {
        let store = AlarmStore::new(1);
        let now = Instant::now();

        let scheduled = store.insert_at(now, 1, 10, "A".to_string()).unwrap();

        assert_eq!(scheduled.expires_at, now + Duration::from_secs(10));
    }

    #[test]
    fn test_dispatch_follows_expiration_order() {
        let store = AlarmStore::new(2);
        let now = Instant::now();
        store.insert_at(now, 1, 10, "A".to_string()).unwrap();
        store.insert_at(now, 2, 3, "B".to_string()).unwrap();

        let due_by = now + Duration::from_secs(3);
        assert_eq!(assigned(store.dispatch_earliest_if_due(due_by).unwrap()).0, 2);
        assert!(matches!(
            store.dispatch_earliest_if_due(due_by).unwrap(),
            Dispatch::NotDue(wait) if wait == Duration::from_secs(7)
        ));
    }

    #[test]
    fn test_update_recomputes_from_update_time() {
        let store = AlarmStore::new(1);
        let start = Instant::now();
        store.insert_at(start, 5, 10, "A".to_string()).unwrap();

        let later = start + Duration::from_secs(4);
        let scheduled = store
            .update_at(later, 5, 2, "A2".to_string())
            .unwrap()
            .unwrap();

        assert_eq!(scheduled.expires_at, later + Duration::from_secs(2));
        let dispatch = store
            .dispatch_earliest_if_due(later + Duration::from_secs(2))
            .unwrap();
        assert_eq!(assigned(dispatch).2, "A2");
    }

    #[test]
    fn test_update_after_dispatch_is_not_found() {
        let store = AlarmStore::new(1);
        let now = Instant::now();
        store.insert_at(now, 5, 0, "A".to_string()).unwrap();

        assigned(store.dispatch_earliest_if_due(now).unwrap());

        assert!(store.update(5, 30, "late".to_string()).unwrap().is_none());
        let taken = store.lock().unwrap().slots.claim(0).unwrap();
        assert_eq!(taken.message, "A");
    }

    #[test]
    fn test_dispatch_after_close_takes_nothing() {
        let store = AlarmStore::new(1);
        let now = Instant::now();
        store.insert_at(now, 1, 0, "A".to_string()).unwrap();

        store.close().unwrap();

        assert!(matches!(
            store.dispatch_earliest_if_due(now).unwrap(),
            Dispatch::Closed
        ));
        assert!(store.lock().unwrap().slots.is_idle(0));
    }

    #[test]
    fn test_insert_if_absent_rejects_pending_duplicate() {
        let store = AlarmStore::new(1);

        assert!(store.insert_if_absent(1, 5, "A".to_string()).unwrap().is_some());
        assert!(store.insert_if_absent(1, 9, "B".to_string()).unwrap().is_none());

        let views = store.snapshot(Instant::now()).unwrap();
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn test_plain_insert_allows_duplicates() {
        let store = AlarmStore::new(1);
        store.insert(1, 5, "A".to_string()).unwrap();
        store.insert(1, 9, "B".to_string()).unwrap();

        assert_eq!(store.snapshot(Instant::now()).unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_reports_pending_and_dispatched() {
        let store = AlarmStore::new(2);
        let now = Instant::now();
        store.insert_at(now, 1, 0, "due".to_string()).unwrap();
        store.insert_at(now, 2, 30, "later".to_string()).unwrap();

        {
            let mut ledger = store.lock().unwrap();
            let TakeOutcome::Due(alarm) = ledger.pending.take_earliest_if_due(now) else {
                panic!("alarm should be due");
            };
            ledger.slots.assign(1, alarm).unwrap();
        }

        let views = store.snapshot(now).unwrap();
        assert_eq!(
            views,
            vec![
                AlarmView {
                    id: 2,
                    status: AlarmStatus::Pending,
                    slot: None,
                    remaining_secs: 30,
                },
                AlarmView {
                    id: 1,
                    status: AlarmStatus::Dispatched,
                    slot: Some(1),
                    remaining_secs: 0,
                },
            ]
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = AlarmStore::new(1);
        store.insert(1, 5, "A".to_string()).unwrap();

        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed().unwrap());
    }

    #[test]
    #[serial]
    fn test_dispatch_and_close_log_outside_the_lock() {
        let store = Arc::new(AlarmStore::new(1));
        let now = Instant::now();

        let audit = audit_logging(&store, || {
            store.insert_at(now, 1, 0, "due".to_string()).unwrap();
            store.insert_at(now, 2, 0, "waiting".to_string()).unwrap();
            assigned(store.dispatch_earliest_if_due(now).unwrap());
            assert!(matches!(
                store.dispatch_earliest_if_due(now).unwrap(),
                Dispatch::Saturated
            ));
            store.close().unwrap();
        });

        // "discarding 1 pending alarms" and "alarm store closed"
        assert!(audit.records >= 2);
        assert!(audit.under_lock.is_empty(), "{:?}", audit.under_lock);
    }

    #[test]
    fn test_wait_for_change_returns_at_once_on_missed_change() {
        let store = AlarmStore::new(1);
        let seen = store.change_count().unwrap();
        store.insert(1, 60, "A".to_string()).unwrap();

        let started = Instant::now();
        store.wait_for_change(seen, Duration::from_secs(5)).unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_for_change_times_out_without_change() {
        let store = AlarmStore::new(1);
        let seen = store.change_count().unwrap();

        let started = Instant::now();
        store.wait_for_change(seen, Duration::from_millis(50)).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pause_ignores_slot_signal_before_deadline() {
        let store = Arc::new(AlarmStore::new(1));
        let pause = Duration::from_millis(300);

        let signaller = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5 {
                    thread::sleep(Duration::from_millis(20));
                    store.signal_slot(0);
                }
            })
        };

        let started = Instant::now();
        assert!(store.pause_unless_closed(0, pause).unwrap());
        assert!(started.elapsed() >= pause);
        signaller.join().unwrap();
    }

    #[test]
    fn test_pause_returns_early_on_close() {
        let store = Arc::new(AlarmStore::new(1));

        let closer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                store.close().unwrap();
            })
        };

        let started = Instant::now();
        assert!(!store.pause_unless_closed(0, Duration::from_secs(30)).unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
        closer.join().unwrap();
    }

    #[test]
    fn test_concurrent_inserts_are_all_kept_in_order() {
        let store = Arc::new(AlarmStore::new(1));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .insert(t * 100 + i, i % 7, format!("{}-{}", t, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        handles.into_iter().for_each(|h| h.join().unwrap());

        let views = store.snapshot(Instant::now()).unwrap();
        assert_eq!(views.len(), 400);

        let ledger = store.lock().unwrap();
        let alarms: Vec<&AlarmRecord> = ledger.pending.iter().collect();
        assert!(alarms.windows(2).all(|w| w[0].order_key() <= w[1].order_key()));
    }

    #[test]
    fn test_wait_for_assignment_rejects_unknown_slot() {
        let store = AlarmStore::new(1);
        let ledger = store.lock().unwrap();

        assert!(matches!(
            store.wait_for_assignment(4, ledger),
            Err(AlarmError::UnknownSlot(4))
        ));
    }

    #[test]
    fn test_pause_rejects_unknown_slot() {
        let store = AlarmStore::new(1);

        assert!(matches!(
            store.pause_unless_closed(2, Duration::from_millis(1)),
            Err(AlarmError::UnknownSlot(2))
        ));
    }
}
