/// Per-game rules configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameConfig {
    /// Starting time for each side.
    pub base_time_ms: u64,
    /// Added to the mover's clock after every committed move.
    pub increment_ms: u64,
    /// Inactivity required before the side not on move may claim abandonment.
    pub abandonment_window_ms: u64,
    /// Committed plies between snapshot checkpoints, on top of the timed ones.
    pub checkpoint_every_plies: u32,
}

impl GameConfig {
    pub const DEFAULT_BASE_TIME_MS: u64 = 10 * 60 * 1_000;
    pub const DEFAULT_INCREMENT_MS: u64 = 0;
    pub const DEFAULT_ABANDONMENT_WINDOW_MS: u64 = 24 * 60 * 60 * 1_000;
    pub const DEFAULT_CHECKPOINT_EVERY_PLIES: u32 = 10;

    pub fn new() -> Self {
        Self {
            base_time_ms: Self::DEFAULT_BASE_TIME_MS,
            increment_ms: Self::DEFAULT_INCREMENT_MS,
            abandonment_window_ms: Self::DEFAULT_ABANDONMENT_WINDOW_MS,
            checkpoint_every_plies: Self::DEFAULT_CHECKPOINT_EVERY_PLIES,
        }
    }

    pub fn with_time_control(base_time_ms: u64, increment_ms: u64) -> Self {
        Self {
            base_time_ms,
            increment_ms,
            ..Self::new()
        }
    }

    pub fn with_abandonment_window(mut self, window_ms: u64) -> Self {
        self.abandonment_window_ms = window_ms;
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::new()
    }
}
