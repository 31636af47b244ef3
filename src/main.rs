//! alarmd - A concurrent alarm scheduler with a fixed pool of announcing workers.
//!
//! # Overview
//!
//! Alarms are entered on the console. Each one carries an integer id, a
//! duration in seconds and a message. A background scheduler hands alarms
//! approaching expiration to a fixed pool of workers; the worker holding an
//! alarm announces it periodically until it expires, then removes it.
//!
//! # Commands
//!
//! - `Start(<id>) <seconds> <message>` - Insert a new alarm
//! - `Change(<id>) <seconds> <message>` - Rewrite a pending alarm, counting
//!   `<seconds>` from now
//!
//! An alarm already handed to a worker can no longer be changed.
//!
//! # Configuration
//!
//! Every setting has a default. An optional YAML file passed with `--config`
//! and `ALARMD_` environment variables override them, see [`config`].
//!
//! ```bash
//! alarmd --config alarmd.yaml --workers 5
//! ```
//!
//! # Architecture
//!
//! - [`alarms`] - Alarm store, scheduler thread and worker pool
//! - [`commands`] - Console command parsing and execution
//! - [`config`] - Layered configuration loading
//! - [`service`] - Wiring of the above and the console loop
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)
//!   - Set to `debug` to list the alarms after every accepted command

use std::{process, sync::Arc};

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{
    alarms::{ConsoleNotifier, Notifier},
    config::Config,
    service::AlarmService,
};

mod alarms;
mod commands;
mod config;
mod service;

/// Command-line arguments for alarmd.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to an optional YAML configuration file.
    ///
    /// Environment variables prefixed with `ALARMD_` take precedence over the
    /// file, for instance `ALARMD_WORKERS__COUNT=5`.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of worker slots, overriding the configuration.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("Starting alarmd {}...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return;
        }
    };

    if let Some(workers) = args.workers {
        config.workers.count = workers;
        if let Err(e) = config.validate() {
            error!("Invalid --workers value: {}", e);
            return;
        }
    }

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let service = match AlarmService::start(&config, notifier) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start alarm service: {}", e);
            return;
        }
    };

    let status = match service.run_console().await {
        Ok(()) => 0,
        Err(e) => {
            error!("Console failed: {}", e);
            1
        }
    };

    if let Err(e) = service.shutdown() {
        error!("Failed to stop alarm service: {}", e);
    }

    // The stdin reader thread cannot be cancelled and would hold the runtime open
    process::exit(status);
}
