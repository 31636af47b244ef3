//! Output sink for alarm status lines.

use log::debug;
use mockall::automock;

use crate::alarms::event::AlarmEvent;

/// Receives every status event produced by the scheduler and the workers.
///
/// Implementations are called from several threads at once and must never
/// block for long: they run outside the store lock, but a slow notifier still
/// delays the calling worker's next announcement.
#[automock]
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlarmEvent);
}

/// Prints status lines on stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, event: &AlarmEvent) {
        debug!("event {:?}", event);
        println!("{}", event);
    }
}
