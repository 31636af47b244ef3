//! Fixed pool of announcing workers.
//!
//! This module provides the [`SlotTable`], which tracks what every worker slot
//! holds, and the [`WorkerPool`], which runs one [`Worker`] thread per slot.
//! A slot goes through three states:
//!
//! ```text
//! Idle ──(scheduler assigns)──▶ Assigned ──(worker claims)──▶ Running ──(expiry)──▶ Idle
//! ```
//!
//! The slot table lives inside the store ledger, so assignment state shares
//! the store mutex with the pending alarms.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info};

use crate::alarms::{
    alarm::{AlarmId, AlarmRecord},
    alarm_store::{AlarmError, AlarmStore, exit_on_error},
    event::AlarmEvent,
    notifier::Notifier,
};

#[derive(Debug)]
pub(crate) enum SlotState {
    Idle,
    /// The scheduler handed over an alarm the worker has not picked up yet.
    Assigned(AlarmRecord),
    /// The worker owns the alarm; only its id and deadline are kept here.
    Running { id: AlarmId, expires_at: Instant },
}

/// Assignment state of every worker slot, with a round-robin cursor.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<SlotState>,
    cursor: usize,
}

impl SlotTable {
    pub fn new(count: usize) -> Self {
        SlotTable {
            slots: (0..count).map(|_| SlotState::Idle).collect(),
            cursor: 0,
        }
    }

    /// Next idle slot in round-robin order, starting after the last assignment.
    ///
    /// Busy slots are skipped. Returns `None` when every slot is busy.
    pub fn next_idle(&self) -> Option<usize> {
        let count = self.slots.len();
        (0..count)
            .map(|offset| (self.cursor + offset) % count)
            .find(|&slot| self.is_idle(slot))
    }

    pub fn is_idle(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(SlotState::Idle))
    }

    /// Hands `alarm` to an idle slot and moves the cursor past it.
    ///
    /// Gives the alarm back when the slot is busy or out of range.
    pub fn assign(&mut self, slot: usize, alarm: AlarmRecord) -> Result<(), AlarmRecord> {
        if !self.is_idle(slot) {
            return Err(alarm);
        }
        let Some(state) = self.slots.get_mut(slot) else {
            return Err(alarm);
        };
        *state = SlotState::Assigned(alarm);
        self.cursor = (slot + 1) % self.slots.len();
        Ok(())
    }

    /// Moves an assigned alarm out of the table into the calling worker.
    pub fn claim(&mut self, slot: usize) -> Option<AlarmRecord> {
        let state = self.slots.get_mut(slot)?;
        let SlotState::Assigned(alarm) = &*state else {
            return None;
        };
        let running = SlotState::Running {
            id: alarm.id,
            expires_at: alarm.expires_at,
        };
        match std::mem::replace(state, running) {
            SlotState::Assigned(alarm) => Some(alarm),
            _ => None,
        }
    }

    pub fn release(&mut self, slot: usize) {
        if let Some(state) = self.slots.get_mut(slot) {
            *state = SlotState::Idle;
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SlotState> {
        self.slots.iter()
    }
}

/// One worker thread bound to one slot.
pub struct Worker {
    slot: usize,
    store: Arc<AlarmStore>,
    notifier: Arc<dyn Notifier>,
    announce_interval: Duration,
}

impl Worker {
    pub fn new(
        slot: usize,
        store: Arc<AlarmStore>,
        notifier: Arc<dyn Notifier>,
        announce_interval: Duration,
    ) -> Self {
        Worker {
            slot,
            store,
            notifier,
            announce_interval,
        }
    }

    fn spawn(self) -> Result<JoinHandle<()>, AlarmError> {
        let name = format!("alarm-worker-{}", self.slot);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || exit_on_error("worker", self.run()))
            .map_err(|source| AlarmError::Spawn { name, source })
    }

    /// Processes one alarm at a time until the store closes.
    pub fn run(&self) -> Result<(), AlarmError> {
        while let Some(alarm) = self.wait_for_alarm()? {
            if !self.announce_until_expired(&alarm)? {
                debug!("worker {} dropped alarm {} on close", self.slot, alarm.id);
                break;
            }
            self.retire(alarm)?;
        }

        debug!("worker {} stopped", self.slot);
        Ok(())
    }

    /// Blocks until the scheduler assigns an alarm to this slot.
    ///
    /// The slot state is checked under the lock before waiting, so an
    /// assignment made between two waits is never lost.
    fn wait_for_alarm(&self) -> Result<Option<AlarmRecord>, AlarmError> {
        let mut ledger = self.store.lock()?;
        let alarm = loop {
            if ledger.closed {
                return Ok(None);
            }
            if let Some(alarm) = ledger.slots.claim(self.slot) {
                break alarm;
            }
            ledger = self.store.wait_for_assignment(self.slot, ledger)?;
        };
        drop(ledger);

        debug!(
            "worker {} claimed alarm {} set for {}s",
            self.slot, alarm.id, alarm.requested_duration
        );
        Ok(Some(alarm))
    }

    /// Announces the alarm every interval until it expires.
    ///
    /// Returns `false` if the store was closed in the meantime. Closing
    /// interrupts the pause between two announcements.
    fn announce_until_expired(&self, alarm: &AlarmRecord) -> Result<bool, AlarmError> {
        loop {
            if alarm.is_due(Instant::now()) {
                return Ok(true);
            }
            if self.store.is_closed()? {
                return Ok(false);
            }

            self.notifier
                .notify(&AlarmEvent::announced(self.slot, alarm));

            let pause = alarm
                .remaining(Instant::now())
                .min(self.announce_interval);
            if !self.store.pause_unless_closed(self.slot, pause)? {
                return Ok(false);
            }
        }
    }

    fn retire(&self, alarm: AlarmRecord) -> Result<(), AlarmError> {
        self.notifier.notify(&AlarmEvent::removed(self.slot, &alarm));
        drop(alarm);

        self.store.release_slot(self.slot)
    }
}

/// Handles of the running worker threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts one worker per slot of `store`.
    pub fn spawn(
        store: &Arc<AlarmStore>,
        notifier: &Arc<dyn Notifier>,
        announce_interval: Duration,
    ) -> Result<Self, AlarmError> {
        let handles = (0..store.slot_count())
            .map(|slot| {
                Worker::new(
                    slot,
                    Arc::clone(store),
                    Arc::clone(notifier),
                    announce_interval,
                )
                .spawn()
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "started {} workers announcing every {:?}",
            handles.len(),
            announce_interval
        );

        Ok(WorkerPool { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to stop. Only returns once the store is closed.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}
