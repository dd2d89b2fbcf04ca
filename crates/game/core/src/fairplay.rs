//! Advisory think-time heuristics.
//!
//! Nothing here feeds back into move acceptance or settlement. Reports are
//! published for operators to review.

use crate::engine::TerminalRecord;
use crate::types::Color;

/// Thresholds for the think-time signals.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FairPlayPolicy {
    /// Moves required before any signal is raised.
    pub min_moves: usize,
    /// Average think time below this is suspicious.
    pub low_average_ms: f64,
    /// Population standard deviation below this is suspicious.
    pub low_stddev_ms: f64,
}

impl Default for FairPlayPolicy {
    fn default() -> Self {
        Self {
            min_moves: 20,
            low_average_ms: 1_200.0,
            low_stddev_ms: 350.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[strum(serialize_all = "snake_case")]
pub enum Risk {
    Unknown,
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    VeryLowAverageThinkTime,
    UnusuallyLowTimeVariance,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FairPlayReport {
    pub move_count: usize,
    pub average_ms: f64,
    pub stddev_ms: f64,
    pub signals: Vec<Signal>,
    pub risk: Risk,
    /// 0.0 (nothing unusual) to 1.0 (both signals at their extreme).
    pub suspicion_score: f64,
}

impl FairPlayReport {
    pub fn is_flagged(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Reports for each side and for the game as a whole.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameFairPlay {
    pub white: FairPlayReport,
    pub black: FairPlayReport,
    pub overall: FairPlayReport,
}

impl GameFairPlay {
    pub fn side(&self, color: Color) -> &FairPlayReport {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// Highest risk across the per-side and overall reports.
    pub fn max_risk(&self) -> Risk {
        self.white.risk.max(self.black.risk).max(self.overall.risk)
    }
}

/// Suspicion score for a sequence of think times.
pub fn score(policy: &FairPlayPolicy, think_times_ms: &[u64]) -> f64 {
    analyze(policy, think_times_ms).suspicion_score
}

pub fn analyze(policy: &FairPlayPolicy, think_times_ms: &[u64]) -> FairPlayReport {
    let move_count = think_times_ms.len();
    if move_count == 0 {
        return FairPlayReport {
            move_count,
            average_ms: 0.0,
            stddev_ms: 0.0,
            signals: Vec::new(),
            risk: Risk::Unknown,
            suspicion_score: 0.0,
        };
    }

    let n = move_count as f64;
    let average_ms = think_times_ms.iter().map(|t| *t as f64).sum::<f64>() / n;
    let variance = think_times_ms
        .iter()
        .map(|t| {
            let d = *t as f64 - average_ms;
            d * d
        })
        .sum::<f64>()
        / n;
    let stddev_ms = variance.sqrt();

    let mut signals = Vec::new();
    let mut suspicion_score = 0.0;
    if move_count >= policy.min_moves {
        if average_ms < policy.low_average_ms {
            signals.push(Signal::VeryLowAverageThinkTime);
        }
        if stddev_ms < policy.low_stddev_ms {
            signals.push(Signal::UnusuallyLowTimeVariance);
        }
        suspicion_score = (shortfall(average_ms, policy.low_average_ms)
            + shortfall(stddev_ms, policy.low_stddev_ms))
            / 2.0;
    }

    let risk = match signals.len() {
        0 => Risk::Low,
        1 => Risk::Medium,
        _ => Risk::High,
    };

    FairPlayReport {
        move_count,
        average_ms,
        stddev_ms,
        signals,
        risk,
        suspicion_score,
    }
}

pub fn analyze_game(policy: &FairPlayPolicy, record: &TerminalRecord) -> GameFairPlay {
    GameFairPlay {
        white: analyze(policy, &record.think_times_of(Color::White)),
        black: analyze(policy, &record.think_times_of(Color::Black)),
        overall: analyze(policy, &record.think_times()),
    }
}

/// How far `value` falls below `threshold`, as a fraction of it.
fn shortfall(value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    ((threshold - value) / threshold).clamp(0.0, 1.0)
}
