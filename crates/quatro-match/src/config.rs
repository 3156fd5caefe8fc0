//! Lobby settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for matchmaking, sessions, and telemetry.
///
/// Every field has a default, so a config file only needs to name what
/// it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Waiting-line capacity. Joins beyond it fail with `QueueFull`.
    pub max_queue_size: usize,
    /// Silence allowed from an in-session participant before they forfeit.
    pub inactivity_timeout_secs: u64,
    /// Points awarded for a human-pair win.
    pub win_points: u64,
    /// Bounds of the bot's simulated thinking time.
    pub bot_think_min_ms: u64,
    pub bot_think_max_ms: u64,
    /// Presence idle threshold for the admin dashboard.
    pub presence_idle_secs: u64,
    /// Rows in `leaderboard_updated`.
    pub leaderboard_size: usize,
    /// Most rows returned by `match_history`.
    pub history_size: usize,
    /// Period of the admin snapshot broadcast. 0 disables it; snapshots
    /// are then only sent on request.
    pub admin_snapshot_interval_secs: u64,
    /// Seeds the bot and thinking-delay RNG. Unset means OS entropy.
    pub bot_seed: Option<u64>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 25,
            inactivity_timeout_secs: 60,
            win_points: 10,
            bot_think_min_ms: 500,
            bot_think_max_ms: 1500,
            presence_idle_secs: 60,
            leaderboard_size: 10,
            history_size: 20,
            admin_snapshot_interval_secs: 5,
            bot_seed: None,
        }
    }
}

impl LobbyConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn bot_think_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.bot_think_min_ms),
            Duration::from_millis(self.bot_think_max_ms),
        )
    }

    pub fn presence_idle(&self) -> Duration {
        Duration::from_secs(self.presence_idle_secs)
    }

    /// `None` when periodic snapshots are disabled.
    pub fn admin_snapshot_interval(&self) -> Option<Duration> {
        (self.admin_snapshot_interval_secs > 0)
            .then(|| Duration::from_secs(self.admin_snapshot_interval_secs))
    }
}
