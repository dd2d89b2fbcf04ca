//! Clock manager.
//!
//! The clock never reads wall time itself. Every operation takes `now`, and
//! elapsed time is charged lazily: [`Clock::elapsed`] projects the counters
//! without changing them, and only [`Clock::on_move_committed`] writes the
//! charge back.

use crate::types::{Color, Timestamp};

/// Remaining time for both sides at some instant, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemainingTime {
    pub white_ms: u64,
    pub black_ms: u64,
}

impl RemainingTime {
    pub const fn get(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }
}

/// Per-game chess clock.
///
/// `running` is the side whose time is currently being consumed; `None`
/// before the game starts and after it ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Clock {
    remaining_ms: [u64; 2],
    increment_ms: u64,
    last_tick: Option<Timestamp>,
    running: Option<Color>,
}

impl Clock {
    pub const fn new(base_ms: u64, increment_ms: u64) -> Self {
        Self {
            remaining_ms: [base_ms, base_ms],
            increment_ms,
            last_tick: None,
            running: None,
        }
    }

    /// Start consuming `side`'s time from `now`.
    pub fn start(self, side: Color, now: Timestamp) -> Self {
        Self {
            last_tick: Some(now),
            running: Some(side),
            ..self
        }
    }

    /// Freeze the clock at `now`, charging the running side up to that instant.
    pub fn stop(self, now: Timestamp) -> Self {
        let projected = self.elapsed(now);
        Self {
            remaining_ms: [projected.white_ms, projected.black_ms],
            last_tick: Some(now),
            running: None,
            ..self
        }
    }

    pub const fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    pub const fn running(&self) -> Option<Color> {
        self.running
    }

    pub const fn last_tick(&self) -> Option<Timestamp> {
        self.last_tick
    }

    /// Stored counter for `side`, without any projection.
    pub const fn stored_ms(&self, side: Color) -> u64 {
        self.remaining_ms[side.index()]
    }

    /// Remaining time for both sides as of `now`. Does not mutate.
    pub fn elapsed(&self, now: Timestamp) -> RemainingTime {
        let mut remaining = self.remaining_ms;
        if let (Some(side), Some(tick)) = (self.running, self.last_tick) {
            let spent = now.millis_since(tick);
            let counter = &mut remaining[side.index()];
            *counter = counter.saturating_sub(spent);
        }
        RemainingTime {
            white_ms: remaining[Color::White.index()],
            black_ms: remaining[Color::Black.index()],
        }
    }

    /// Charge `mover` for the time since the last tick, add the increment,
    /// and hand the clock to the opponent.
    pub fn on_move_committed(&self, mover: Color, now: Timestamp) -> Self {
        let mut remaining_ms = self.remaining_ms;
        let spent = match self.last_tick {
            Some(tick) if self.running == Some(mover) => now.millis_since(tick),
            _ => 0,
        };
        let counter = &mut remaining_ms[mover.index()];
        *counter = counter.saturating_sub(spent).saturating_add(self.increment_ms);

        Self {
            remaining_ms,
            increment_ms: self.increment_ms,
            last_tick: Some(now),
            running: Some(mover.opposite()),
        }
    }

    /// The running side, if its remaining time has reached zero at `now`.
    pub fn has_flagged(&self, now: Timestamp) -> Option<Color> {
        let side = self.running?;
        (self.elapsed(now).get(side) == 0).then_some(side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = Timestamp(1_000_000);

    #[test]
    fn elapsed_is_lazy() {
        let clock = Clock::new(60_000, 0).start(Color::White, T0);
        let projected = clock.elapsed(T0.plus_millis(5_000));
        assert_eq!(projected.white_ms, 55_000);
        assert_eq!(projected.black_ms, 60_000);
        assert_eq!(clock.stored_ms(Color::White), 60_000);
    }

    #[test]
    fn commit_charges_mover_and_adds_increment() {
        let clock = Clock::new(60_000, 2_000).start(Color::White, T0);
        let next = clock.on_move_committed(Color::White, T0.plus_millis(3_000));
        assert_eq!(next.stored_ms(Color::White), 59_000);
        assert_eq!(next.running(), Some(Color::Black));
        assert_eq!(next.last_tick(), Some(T0.plus_millis(3_000)));

        let projected = next.elapsed(T0.plus_millis(4_000));
        assert_eq!(projected.black_ms, 59_000);
        assert_eq!(projected.white_ms, 59_000);
    }

    #[test]
    fn negative_time_clamps_and_flags() {
        let clock = Clock::new(1_000, 0).start(Color::White, T0);
        assert_eq!(clock.has_flagged(T0.plus_millis(999)), None);

        let late = T0.plus_millis(10_000);
        assert_eq!(clock.elapsed(late).white_ms, 0);
        assert_eq!(clock.has_flagged(late), Some(Color::White));
    }

    #[test]
    fn stopped_clock_never_flags() {
        let clock = Clock::new(1_000, 0)
            .start(Color::Black, T0)
            .stop(T0.plus_millis(400));
        assert_eq!(clock.stored_ms(Color::Black), 600);
        assert_eq!(clock.has_flagged(T0.plus_millis(100_000)), None);
        assert_eq!(clock.elapsed(T0.plus_millis(100_000)).black_ms, 600);
    }

    #[test]
    fn clock_before_start_does_not_run() {
        let clock = Clock::new(5_000, 0);
        assert_eq!(clock.elapsed(T0).white_ms, 5_000);
        assert_eq!(clock.has_flagged(T0), None);
    }
}
