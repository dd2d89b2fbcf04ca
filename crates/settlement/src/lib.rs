//! Settlement of finished wagers.
//!
//! Turns a stored terminal record into the one judge signature its payload
//! will ever get, hands it to the beneficiary as a [`ClaimTicket`], and marks
//! the claim once the ledger confirms it.
pub mod config;
mod coordinator;
pub mod error;
pub mod ledger;
pub mod signer;

pub use config::SettlementConfig;
pub use coordinator::{ClaimTicket, SettlementCoordinator};
pub use error::{Result, SettlementError};
pub use ledger::{ClaimStatus, LedgerError, LedgerVerifier, MockLedger, UnconfiguredLedger};
pub use signer::{JudgeSigner, PayloadSigner, SignerError, address_of, recover, verify};
