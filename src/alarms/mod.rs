//! Alarm storage, scheduling and announcement.
//!
//! This module provides the concurrent core of the service. It consists of
//! three cooperating parts sharing one [`AlarmStore`]:
//!
//! - [`AlarmStore`]: Holds pending alarms ordered by expiration, and the
//!   worker slot table, behind a single mutex
//! - [`Scheduler`]: Background thread moving the earliest due alarm into an
//!   idle worker slot
//! - [`WorkerPool`]: Fixed set of worker threads, each announcing the alarm in
//!   its slot until it expires, then removing it
//!
//! Status lines are emitted as [`AlarmEvent`]s through a [`Notifier`].
//!
//! # Architecture
//!
//! ```text
//! Commander ──insert/update──▶ AlarmStore ◀──take+assign── Scheduler
//!                                  │
//!                                  └──slot signal──▶ Worker #0..#n ──▶ Notifier
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use alarmd::alarms::{AlarmStore, ConsoleNotifier, Notifier, Scheduler, WorkerPool};
//!
//! let store = Arc::new(AlarmStore::new(3));
//! let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
//!
//! let pool = WorkerPool::spawn(&store, &notifier, Duration::from_secs(5))?;
//! let scheduler = Scheduler::new(
//!     Arc::clone(&store),
//!     notifier,
//!     Duration::from_secs(1),
//!     Duration::ZERO,
//! )
//! .spawn()?;
//!
//! store.insert(1, 30, "stretch".to_string())?;
//!
//! store.close()?;
//! let _ = scheduler.join();
//! pool.join();
//! # Ok::<(), alarmd::alarms::AlarmError>(())
//! ```

mod alarm;
mod alarm_store;
mod event;
mod notifier;
mod pending;
mod scheduler;
mod worker_pool;

pub use crate::alarms::alarm::AlarmId;
pub use crate::alarms::alarm_store::{AlarmError, AlarmStore};
pub use crate::alarms::event::AlarmEvent;
#[cfg(test)]
pub(crate) use crate::alarms::{alarm::AlarmStatus, alarm_store::Dispatch, notifier::testing};
pub use crate::alarms::notifier::{ConsoleNotifier, Notifier};
pub use crate::alarms::scheduler::Scheduler;
pub use crate::alarms::worker_pool::WorkerPool;
