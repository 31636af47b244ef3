//! Background scheduler moving due alarms into idle worker slots.
//!
//! The scheduler is a polling loop with an edge-triggered shortcut: it waits
//! on the store's `changed` condition variable with a timeout, so inserts,
//! updates and slot releases wake it at once, while the timeout bounds how
//! long a due alarm can go unnoticed.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::alarms::{
    alarm_store::{AlarmError, AlarmStore, Dispatch, exit_on_error},
    notifier::Notifier,
};

pub struct Scheduler {
    store: Arc<AlarmStore>,
    notifier: Arc<dyn Notifier>,
    /// Upper bound of every wait between two scheduling steps.
    poll_interval: Duration,
    /// How long before its expiration an alarm counts as due. Zero by default.
    dispatch_lead: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<AlarmStore>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
        dispatch_lead: Duration,
    ) -> Self {
        Scheduler {
            store,
            notifier,
            poll_interval,
            dispatch_lead,
        }
    }

    /// Starts the scheduler on its own thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, AlarmError> {
        let name = "alarm-scheduler".to_string();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || exit_on_error("scheduler", self.run()))
            .map_err(|source| AlarmError::Spawn { name, source })
    }

    /// Dispatches alarms until the store is closed.
    ///
    /// The change counter is read before each step, so a change racing with
    /// the step ends the following wait at once.
    pub fn run(&self) -> Result<(), AlarmError> {
        info!(
            "scheduler started, polling every {:?}, dispatching {:?} ahead of expiry",
            self.poll_interval, self.dispatch_lead
        );

        loop {
            let seen = self.store.change_count()?;
            let pause = match self.store.dispatch_earliest_if_due(self.due_by(Instant::now()))? {
                Dispatch::Assigned(event) => {
                    debug!("alarm {} dispatched", event.alarm_id());
                    self.notifier.notify(&event);
                    continue;
                }
                Dispatch::Closed => break,
                Dispatch::Saturated => {
                    debug!("all worker slots busy");
                    self.poll_interval
                }
                Dispatch::Idle => self.poll_interval,
                Dispatch::NotDue(wait) => wait.min(self.poll_interval),
            };
            self.store.wait_for_change(seen, pause)?;
        }

        info!("scheduler stopped");
        Ok(())
    }

    /// Latest expiration counting as due at `now`.
    fn due_by(&self, now: Instant) -> Instant {
        now + self.dispatch_lead
    }
}
