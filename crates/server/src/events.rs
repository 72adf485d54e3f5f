use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PlayerRegistered {
        player_id: String,
        name: String,
        client_id: String,
    },
    RegistrationRejected {
        name: String,
        reason: String,
    },
    PlayerTimedOut {
        player_id: String,
        name: String,
    },
    PlayerEliminated {
        player_id: String,
        by: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ServerEvent::PlayerRegistered { .. } | ServerEvent::PlayerEliminated { .. } => {
                Severity::Info
            }
            ServerEvent::RegistrationRejected { .. } | ServerEvent::PlayerTimedOut { .. } => {
                Severity::Warn
            }
            ServerEvent::Error { .. } => Severity::Error,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ServerEvent::PlayerRegistered {
                player_id,
                name,
                client_id,
            } => format!("{} joined as {} (client {})", name, player_id, client_id),
            ServerEvent::RegistrationRejected { name, reason } => {
                format!("rejected {:?}: {}", name, reason)
            }
            ServerEvent::PlayerTimedOut { player_id, name } => {
                format!("{} ({}) timed out", name, player_id)
            }
            ServerEvent::PlayerEliminated { player_id, by } => {
                format!("{} eliminated by {}", player_id, by)
            }
            ServerEvent::Error { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub at: Instant,
    pub event: ServerEvent,
}

/// Bounded history of operator-facing events, shared by the dashboard and
/// the headless log.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<LoggedEvent>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<LoggedEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: ServerEvent) {
        match event.severity() {
            Severity::Info => log::info!("{}", event.describe()),
            Severity::Warn => log::warn!("{}", event.describe()),
            Severity::Error => log::error!("{}", event.describe()),
        }

        let mut entries = self.entries();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LoggedEvent {
            at: Instant::now(),
            event,
        });
    }

    /// The newest `count` events, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LoggedEvent> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_events() {
        let log = EventLog::new(2);
        for n in 0..3 {
            log.push(ServerEvent::Error {
                message: n.to_string(),
            });
        }

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event.describe(), "1");
        assert_eq!(recent[1].event.describe(), "2");
        assert_eq!(log.recent(1)[0].event.describe(), "2");
    }
}
