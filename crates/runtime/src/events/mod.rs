//! Topic-based event bus for runtime events.
//!
//! Events are published to specific topics, and consumers subscribe only to
//! the topics they need. Delivery is best effort: a slow subscriber lags and
//! misses events rather than slowing a session down.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{OutcomeEvent, SessionNotice, SettlementEvent};
