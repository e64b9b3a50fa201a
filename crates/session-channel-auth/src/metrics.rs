//! Usage counters for the auth commands.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Auth command whose calls are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCommand {
    Login,
    Logout,
}

impl AuthCommand {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

/// Point-in-time copy of [`CommandMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandUsage {
    pub login: u64,
    pub logout: u64,
}

/// Counts calls made from inside a session.
///
/// Calls without a session context are not counted.
#[derive(Debug, Default)]
pub struct CommandMetrics {
    login: AtomicU64,
    logout: AtomicU64,
}

impl CommandMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call of `command` and return the new total.
    pub fn record(&self, command: AuthCommand) -> u64 {
        let counter = match command {
            AuthCommand::Login => &self.login,
            AuthCommand::Logout => &self.logout,
        };
        let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(command = command.name(), total, "Command used");
        total
    }

    #[must_use]
    pub fn snapshot(&self) -> CommandUsage {
        CommandUsage {
            login: self.login.load(Ordering::Relaxed),
            logout: self.logout.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_record_counts_per_command() {
        let metrics = CommandMetrics::new();
        assert_eq!(metrics.snapshot(), CommandUsage::default());

        assert_eq!(metrics.record(AuthCommand::Login), 1);
        assert_eq!(metrics.record(AuthCommand::Login), 2);
        assert_eq!(metrics.record(AuthCommand::Logout), 1);

        assert_eq!(metrics.snapshot(), CommandUsage { login: 2, logout: 1 });
    }

    #[test]
    fn test_record_from_many_threads() {
        let metrics = Arc::new(CommandMetrics::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let metrics = Arc::clone(&metrics);
                scope.spawn(move || {
                    for _ in 0..250 {
                        metrics.record(AuthCommand::Logout);
                    }
                });
            }
        });
        assert_eq!(metrics.snapshot().logout, 1_000);
    }
}
