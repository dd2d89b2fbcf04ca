//! Repository layer for durable game data.
//!
//! Repositories persist what must survive a process restart:
//! - Periodic game snapshots (for recovery of live sessions)
//! - Terminal records (written exactly once per game)
//! - Settlement signatures (at most one per payload hash)

mod error;
mod file;
mod memory;
mod traits;

pub use error::{RepositoryError, Result};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use traits::{GameRepository, SignatureRepository, SignatureWrite, TerminalWrite};
