//! Check a stored settlement signature
//!
//! Rebuilds the payload from the terminal record, loads the signature stored
//! under its hash and recovers the signing address. Fails when the recovered
//! address is not the judge.

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::style;
use std::path::PathBuf;

use chess_core::{Address, Beneficiary, GameId, SettlementPayload};
use runtime::SignatureRepository;
use settlement::{JudgeSigner, SettlementConfig};

use crate::utils;

/// Verify the stored signature of a finished game
#[derive(Parser)]
pub struct VerifySignature {
    #[arg(value_name = "GAME_ID")]
    game_id: u64,

    /// Custom data directory (defaults to platform-specific location)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Settlement contract address (defaults to CHESS_CONTRACT_ADDRESS)
    #[arg(long, value_name = "ADDRESS")]
    contract: Option<Address>,

    /// Expected judge address (defaults to the address of JUDGE_PRIVATE_KEY)
    #[arg(long, value_name = "ADDRESS")]
    judge: Option<Address>,
}

impl VerifySignature {
    pub fn execute(self) -> Result<()> {
        const CONTRACT_VAR: &str = SettlementConfig::CONTRACT_VAR;
        const JUDGE_KEY_VAR: &str = SettlementConfig::JUDGE_KEY_VAR;

        let contract = match self.contract {
            Some(contract) => contract,
            None => std::env::var(CONTRACT_VAR)
                .with_context(|| format!("Pass --contract or set {CONTRACT_VAR}"))?
                .parse()
                .with_context(|| format!("Invalid {CONTRACT_VAR}"))?,
        };
        let judge = match self.judge {
            Some(judge) => judge,
            None => {
                let key = std::env::var(JUDGE_KEY_VAR)
                    .with_context(|| format!("Pass --judge or set {JUDGE_KEY_VAR}"))?;
                JudgeSigner::from_hex(&key)
                    .context("Invalid judge key")?
                    .address()
            }
        };

        let repository = utils::open_repository(self.data_dir)?;
        let game_id = GameId(self.game_id);
        let terminal = utils::load_terminal(&repository, game_id)?;
        let payload = SettlementPayload::for_terminal(&terminal, contract);
        let hash = payload.hash();

        let record = utils::block_on(repository.load_signature(&hash))?
            .context("Failed to read signature")?
            .with_context(|| format!("No signature stored for game {game_id} (hash {hash})"))?;
        let signer = settlement::recover(&record.payload_hash, &record.signature)
            .context("Signature does not recover")?;

        println!("{}", style(format!("=== Signature: game {game_id} ===")).bold().green());
        match payload.beneficiary {
            Beneficiary::Address(address) => println!("  Beneficiary: {address}"),
            Beneficiary::Draw => println!("  Beneficiary: draw (stakes returned)"),
        }
        println!("  Payload hash: {hash}");
        println!("  Signature: 0x{}", hex::encode(record.signature.to_bytes()));
        println!("  Recovered signer: {signer}");
        match &record.claim_tx {
            Some(tx) if record.claimed => println!("  Claimed: yes ({tx})"),
            _ => println!("  Claimed: no"),
        }

        if signer != judge {
            bail!("Signature was produced by {signer}, expected judge {judge}");
        }
        println!("{}", style("Signature is valid").green().bold());
        Ok(())
    }
}

