//! Alarm service wiring the store, the scheduler, the workers and the console.
//!
//! This module provides the [`AlarmService`], which owns every running part of
//! the scheduler and feeds console lines to the [`Commander`].
//!
//! # Architecture
//!
//! The service runs three kinds of concurrent tasks:
//!
//! 1. **Console Task** (async, main): reads stdin line by line, parses and
//!    executes commands, prints the response
//! 2. **Scheduler Thread**: moves due alarms into idle worker slots
//! 3. **Worker Threads**: announce their alarm until it expires, then remove it
//!
//! The console task never blocks on the alarm threads: store operations only
//! hold the store lock for the duration of an insert or an update.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use alarmd::{alarms::{ConsoleNotifier, Notifier}, config::Config, service::AlarmService};
//! # async fn run() -> Result<(), anyhow::Error> {
//! let config = Config::load(None)?;
//! let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
//!
//! let service = AlarmService::start(&config, notifier)?;
//! service.run_console().await?; // Runs until end of input or Ctrl-C
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::{
    io::{IsTerminal, Write},
    sync::Arc,
    thread::JoinHandle,
};

use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    alarms::{AlarmError, AlarmStore, Notifier, Scheduler, WorkerPool},
    commands::{CommandParseError, CommandResult, Commander},
    config::Config,
};

const PROMPT: &str = "alarm> ";

/// Running alarm scheduler with its console front end.
pub struct AlarmService {
    store: Arc<AlarmStore>,
    commander: Commander,
    scheduler: JoinHandle<()>,
    workers: WorkerPool,
}

impl AlarmService {
    /// Creates the store and starts the worker pool and the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned. Threads already
    /// started are stopped before returning.
    pub fn start(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, AlarmError> {
        let store = Arc::new(AlarmStore::new(config.workers.count));

        let workers = WorkerPool::spawn(&store, &notifier, config.workers.announce_interval())?;

        let scheduler = Scheduler::new(
            Arc::clone(&store),
            notifier,
            config.scheduler.poll_interval(),
            config.scheduler.dispatch_lead(),
        )
        .spawn();
        let scheduler = match scheduler {
            Ok(handle) => handle,
            Err(e) => {
                store.close()?;
                workers.join();
                return Err(e);
            }
        };

        let commander = Commander::new(Arc::clone(&store), &config.commands);

        info!("alarm service started with {} workers", workers.len());

        Ok(AlarmService {
            store,
            commander,
            scheduler,
            workers,
        })
    }

    /// Parses and executes one console line.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Blank line, nothing to answer
    /// * `Ok(Some(CommandResult))` - Response to show, accepted or not
    pub fn handle_line(&self, line: &str) -> Result<Option<CommandResult>, AlarmError> {
        let command = match self.commander.parse(line) {
            Ok(command) => command,
            Err(CommandParseError::Ignored) => return Ok(None),
            Err(CommandParseError::InvalidCommand(response)) => {
                return Ok(Some(CommandResult {
                    response,
                    accepted: false,
                }));
            }
        };

        self.commander.execute(command).map(Some)
    }

    /// Reads commands from stdin until end of input or Ctrl-C.
    ///
    /// Accepted commands are answered on stdout, refused ones on stderr. A
    /// prompt is shown when stdin is a terminal.
    pub async fn run_console(&self) -> anyhow::Result<()> {
        let interactive = std::io::stdin().is_terminal();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if interactive {
                print!("{}", PROMPT);
                std::io::stdout().flush()?;
            }

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, closing console");
                    break;
                }
            };
            let Some(line) = line else {
                info!("end of input, closing console");
                break;
            };

            match self.handle_line(&line)? {
                Some(result) if result.accepted => println!("{}", result.response),
                Some(result) => eprintln!("{}", result.response),
                None => {}
            }
        }

        Ok(())
    }

    /// Closes the store and waits for the scheduler and every worker to stop.
    ///
    /// Pending alarms and alarms being announced are discarded.
    pub fn shutdown(self) -> Result<(), AlarmError> {
        self.store.close()?;

        if self.scheduler.join().is_err() {
            error!("scheduler thread panicked");
        }
        self.workers.join();

        info!("alarm service stopped");
        Ok(())
    }
}
