//! Time sources for sessions.
//!
//! Sessions never read the system clock directly. Every operation takes a
//! [`Timestamp`] from the runtime's [`TimeSource`], which tests replace with a
//! [`ManualClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chess_core::Timestamp;

pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> Timestamp {
        let millis = chrono::Utc::now().timestamp_millis();
        Timestamp::from_millis(u64::try_from(millis).unwrap_or(0))
    }
}

/// Externally driven clock. Cloning shares the same instant.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    pub fn advance(&self, ms: u64) -> Timestamp {
        let previous = self.millis.fetch_add(ms, Ordering::SeqCst);
        Timestamp::from_millis(previous.saturating_add(ms))
    }

    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
