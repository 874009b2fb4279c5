//! Server configuration and session timing constants.

use std::time::Duration;

/// Grace period between `start` and the first question.
pub const START_DELAY: Duration = Duration::from_secs(3);
/// Delay before a leaderboard is pushed after an answer round settles.
pub const LEADERBOARD_DELAY: Duration = Duration::from_secs(1);
/// Delay before an automatic advance once a question is over.
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);
/// Delay between running out of questions and ending the session.
pub const END_GRACE: Duration = Duration::from_secs(2);
/// How long a completed session stays readable for late reconnects.
pub const CLEANUP_DELAY: Duration = Duration::from_secs(5 * 60);
/// Disconnects at or beyond this count flag a reconnect as unlikely.
pub const RECONNECT_LIKELY_LIMIT: u32 = 3;

/// All delays a session actor schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub start_delay: Duration,
    pub leaderboard_delay: Duration,
    pub settle_delay: Duration,
    pub end_grace: Duration,
    pub cleanup_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            start_delay: START_DELAY,
            leaderboard_delay: LEADERBOARD_DELAY,
            settle_delay: SETTLE_DELAY,
            end_grace: END_GRACE,
            cleanup_delay: CLEANUP_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub timings: Timings,
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            bind_addr: format!("{}:{}", host, port),
            timings: Timings::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }
}
