//! Command orchestration and execution.
//!
//! The [`Commander`] parses console lines and applies them to the shared
//! [`AlarmStore`]. It never touches worker slots: once an alarm has been
//! dispatched, `Change` no longer sees it.

use std::{sync::Arc, time::Instant};

use log::{debug, info};

use crate::{
    alarms::{AlarmError, AlarmEvent, AlarmId, AlarmStore},
    commands::{
        CommandParseError, CommandResult,
        command::{Command, format_command_error},
        responses::{format_duplicate_alarm, format_unknown_alarm},
    },
    config,
};

/// Command orchestrator for parsing and executing console commands.
pub struct Commander {
    store: Arc<AlarmStore>,
    max_message_len: usize,
    reject_duplicate_ids: bool,
}

impl Commander {
    /// Creates a commander writing into `store`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use alarmd::{alarms::AlarmStore, commands::Commander, config};
    /// let store = Arc::new(AlarmStore::new(3));
    /// let commander = Commander::new(store, &config::Commands::default());
    /// ```
    pub fn new(store: Arc<AlarmStore>, config: &config::Commands) -> Self {
        Commander {
            store,
            max_message_len: config.max_message_len,
            reject_duplicate_ids: config.reject_duplicate_ids,
        }
    }

    /// Parses one console line into a structured command.
    ///
    /// # Returns
    ///
    /// * `Ok(Command)` - Successfully parsed command
    /// * `Err(CommandParseError::Ignored)` - Blank line
    /// * `Err(CommandParseError::InvalidCommand)` - Line matching no command shape
    pub fn parse(&self, line: &str) -> Result<Command, CommandParseError> {
        Command::parse(line, self.max_message_len).map_err(|error| {
            match format_command_error(error) {
                Some(message) => CommandParseError::InvalidCommand(message),
                None => CommandParseError::Ignored,
            }
        })
    }

    /// Applies a parsed command to the store.
    ///
    /// # Errors
    ///
    /// Only fails when the store lock is poisoned.
    pub fn execute(&self, command: Command) -> Result<CommandResult, AlarmError> {
        let result = match command {
            Command::Start {
                id,
                seconds,
                message,
            } => self.submit_insert(id, seconds, message)?,
            Command::Change {
                id,
                seconds,
                message,
            } => self.submit_update(id, seconds, message)?,
        };

        if result.accepted {
            self.log_alarms()?;
        }
        Ok(result)
    }

    /// Inserts a new alarm, refusing pending duplicates when configured.
    pub fn submit_insert(
        &self,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<CommandResult, AlarmError> {
        let event_message = message.clone();
        let scheduled = if self.reject_duplicate_ids {
            self.store.insert_if_absent(id, seconds, message)?
        } else {
            Some(self.store.insert(id, seconds, message)?)
        };

        let Some(scheduled) = scheduled else {
            info!("start of alarm {} refused, id already pending", id);
            return Ok(CommandResult {
                response: format_duplicate_alarm(id),
                accepted: false,
            });
        };

        debug!(
            "alarm {} due in {:?}",
            id,
            scheduled.expires_at.saturating_duration_since(Instant::now())
        );
        Ok(CommandResult {
            response: AlarmEvent::inserted(id, &scheduled, &event_message).to_string(),
            accepted: true,
        })
    }

    /// Rewrites the pending alarm `id`, counting `seconds` from now.
    pub fn submit_update(
        &self,
        id: AlarmId,
        seconds: i32,
        message: String,
    ) -> Result<CommandResult, AlarmError> {
        let event_message = message.clone();
        match self.store.update(id, seconds, message)? {
            Some(scheduled) => Ok(CommandResult {
                response: AlarmEvent::changed(id, &scheduled, &event_message).to_string(),
                accepted: true,
            }),
            None => {
                info!("change of alarm {} refused, not pending", id);
                Ok(CommandResult {
                    response: format_unknown_alarm(id),
                    accepted: false,
                })
            }
        }
    }

    fn log_alarms(&self) -> Result<(), AlarmError> {
        if !log::log_enabled!(log::Level::Debug) {
            return Ok(());
        }
        for view in self.store.snapshot(Instant::now())? {
            debug!(
                "alarm {} {:?} slot {:?} {}s left",
                view.id, view.status, view.slot, view.remaining_secs
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarms::{AlarmStatus, Dispatch};

    fn create_commander(reject_duplicate_ids: bool) -> (Arc<AlarmStore>, Commander) {
        let store = Arc::new(AlarmStore::new(1));
        let config = config::Commands {
            max_message_len: 16,
            reject_duplicate_ids,
        };
        let commander = Commander::new(Arc::clone(&store), &config);
        (store, commander)
    }

    fn run(commander: &Commander, line: &str) -> CommandResult {
        let command = commander.parse(line).unwrap();
        commander.execute(command).unwrap()
    }

    #[test]
    fn test_parse_blank_line_is_ignored() {
        let (_, commander) = create_commander(true);
        assert_eq!(commander.parse("  "), Err(CommandParseError::Ignored));
    }

    #[test]
    fn test_parse_malformed_line_is_invalid() {
        let (_, commander) = create_commander(true);
        assert_eq!(
            commander.parse("Start 1 10 hello"),
            Err(CommandParseError::InvalidCommand("Bad command".to_string()))
        );
    }

    #[test]
    fn test_parse_uses_configured_message_length() {
        let (_, commander) = create_commander(true);
        let Ok(Command::Start { message, .. }) =
            commander.parse("Start(1) 5 abcdefghijklmnopqrstuvwxyz")
        else {
            panic!("command should parse");
        };
        assert_eq!(message, "abcdefghijklmnop");
    }

    #[test]
    fn test_start_inserts_pending_alarm() {
        let (store, commander) = create_commander(true);

        let result = run(&commander, "Start(1) 10 A");

        assert!(result.accepted);
        assert!(result.response.starts_with("Alarm(1) inserted, expires at "));
        assert!(result.response.ends_with("\"A\""));
        let views = store.snapshot(Instant::now()).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, AlarmStatus::Pending);
    }

    #[test]
    fn test_start_duplicate_is_refused() {
        let (store, commander) = create_commander(true);
        run(&commander, "Start(1) 10 A");

        let result = run(&commander, "Start(1) 20 B");

        assert!(!result.accepted);
        assert_eq!(result.response, format_duplicate_alarm(1));
        assert_eq!(store.snapshot(Instant::now()).unwrap().len(), 1);
    }

    #[test]
    fn test_start_duplicate_accepted_when_allowed() {
        let (store, commander) = create_commander(false);
        run(&commander, "Start(1) 10 A");

        let result = run(&commander, "Start(1) 20 B");

        assert!(result.accepted);
        assert_eq!(store.snapshot(Instant::now()).unwrap().len(), 2);
    }

    #[test]
    fn test_change_rewrites_pending_alarm() {
        let (store, commander) = create_commander(true);
        run(&commander, "Start(1) 30 A");
        run(&commander, "Start(2) 10 B");

        let result = run(&commander, "Change(1) 0 A2");

        assert!(result.accepted);
        assert!(result.response.starts_with("Alarm(1) changed, expires at "));
        let dispatch = store.dispatch_earliest_if_due(Instant::now()).unwrap();
        assert!(matches!(
            dispatch,
            Dispatch::Assigned(AlarmEvent::Dispatched { id: 1, message, .. }) if message == "A2"
        ));
    }

    #[test]
    fn test_change_unknown_alarm_is_refused() {
        let (store, commander) = create_commander(true);

        let result = run(&commander, "Change(5) 10 nothing");

        assert!(!result.accepted);
        assert_eq!(result.response, "Alarm(5) is not pending, nothing changed");
        assert!(store.snapshot(Instant::now()).unwrap().is_empty());
    }

    #[test]
    fn test_change_after_dispatch_is_refused() {
        let (store, commander) = create_commander(true);
        run(&commander, "Start(3) 0 gone");
        assert!(matches!(
            store.dispatch_earliest_if_due(Instant::now()).unwrap(),
            Dispatch::Assigned(_)
        ));

        let result = run(&commander, "Change(3) 10 too late");

        assert!(!result.accepted);
    }
}
