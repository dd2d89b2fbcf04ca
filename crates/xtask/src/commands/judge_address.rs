//! Derive the judge address from its private key

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use settlement::{JudgeSigner, SettlementConfig};

const JUDGE_KEY_VAR: &str = SettlementConfig::JUDGE_KEY_VAR;

/// Print the ledger address the contract must trust as judge
#[derive(Parser)]
pub struct JudgeAddress {
    /// Hex private key (defaults to JUDGE_PRIVATE_KEY)
    #[arg(short, long, value_name = "HEX")]
    key: Option<String>,
}

impl JudgeAddress {
    pub fn execute(self) -> Result<()> {
        let key = match self.key {
            Some(key) => key,
            None => std::env::var(JUDGE_KEY_VAR)
                .with_context(|| format!("Pass --key or set {JUDGE_KEY_VAR}"))?,
        };
        let signer = JudgeSigner::from_hex(&key).context("Invalid judge key")?;

        println!("{} {}", style("Judge address:").bold(), signer.address());
        Ok(())
    }
}
