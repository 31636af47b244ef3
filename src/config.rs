//! Configuration of the alarm scheduler.
//!
//! Configuration is layered with figment. Every value has a default, an
//! optional YAML file overrides the defaults, and environment variables
//! prefixed with `ALARMD_` override the file. Nested keys are separated by a
//! double underscore.
//!
//! # Configuration File Format
//!
//! ```yaml
//! scheduler:
//!   # Longest pause between two scheduling passes, in milliseconds
//!   poll_interval_ms: 1000
//!   # Hand alarms to a worker this many seconds before they expire (opt-in)
//!   dispatch_lead_secs: 0
//!
//! workers:
//!   # Number of worker slots
//!   count: 3
//!   # Seconds between two announcements of the same alarm
//!   announce_interval_secs: 5
//!
//! commands:
//!   # Messages are cut to this many characters
//!   max_message_len: 128
//!   # Refuse `Start` for an id that is already pending
//!   reject_duplicate_ids: true
//! ```
//!
//! # Environment Variable Overrides
//!
//! ```bash
//! export ALARMD_WORKERS__COUNT=5
//! export ALARMD_SCHEDULER__POLL_INTERVAL_MS=250
//! ```

use std::{path::Path, time::Duration};

use anyhow::{bail, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

/// Prefix of the environment variables read by [`Config::load`].
const ENV_PREFIX: &str = "ALARMD_";

/// Root configuration structure.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Scheduler loop settings
    pub scheduler: Scheduler,
    /// Worker pool settings
    pub workers: Workers,
    /// Command port settings
    pub commands: Commands,
}

/// Scheduler loop settings.
///
/// # YAML Section
///
/// ```yaml
/// scheduler:
///   poll_interval_ms: 1000
///   dispatch_lead_secs: 0
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scheduler {
    /// Upper bound, in milliseconds, of every scheduler wait.
    ///
    /// The scheduler is also woken early by inserts, updates and released
    /// slots, so this only bounds how late a due alarm can be noticed when
    /// nothing else happens.
    pub poll_interval_ms: u64,

    /// Seconds before expiration at which an alarm is dispatched.
    ///
    /// Defaults to `0`: an alarm is due once it expires, stays updatable
    /// until then, and its worker removes it without announcing. A positive
    /// lead hands alarms over early so the worker announces them during the
    /// window, at the cost of refusing `Change` inside it.
    pub dispatch_lead_secs: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler {
            poll_interval_ms: 1000,
            dispatch_lead_secs: 0,
        }
    }
}

impl Scheduler {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_lead(&self) -> Duration {
        Duration::from_secs(self.dispatch_lead_secs)
    }
}

/// Worker pool settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Workers {
    /// Number of worker slots, each holding at most one alarm.
    pub count: usize,
    /// Seconds between two announcements of the alarm a worker holds.
    pub announce_interval_secs: u64,
}

impl Default for Workers {
    fn default() -> Self {
        Workers {
            count: 3,
            announce_interval_secs: 5,
        }
    }
}

impl Workers {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }
}

/// Command port settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Commands {
    /// Maximum message length, in characters. Longer messages are cut.
    pub max_message_len: usize,
    /// Refuse a `Start` whose id is already pending.
    ///
    /// When `false`, duplicates are accepted and coexist as independent
    /// alarms; a `Change` then updates the one expiring first.
    pub reject_duplicate_ids: bool,
}

impl Default for Commands {
    fn default() -> Self {
        Commands {
            max_message_len: 128,
            reject_duplicate_ids: true,
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, an optional YAML file and
    /// `ALARMD_` environment variables, in increasing priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or if a
    /// value is out of range.
    pub fn load(path: Option<&str>) -> anyhow::Result<Config> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !Path::new(path).exists() {
                bail!("config file {} not found", path);
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.workers.count >= 1, "workers.count must be at least 1");
        ensure!(
            self.workers.announce_interval_secs >= 1,
            "workers.announce_interval_secs must be at least 1"
        );
        ensure!(
            self.scheduler.poll_interval_ms >= 1,
            "scheduler.poll_interval_ms must be at least 1"
        );
        ensure!(
            self.commands.max_message_len >= 1,
            "commands.max_message_len must be at least 1"
        );
        Ok(())
    }
}
