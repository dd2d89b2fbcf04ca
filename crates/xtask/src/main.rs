//! Operator tasks for the chess arbiter
//!
//! This binary provides inspection utilities using the cargo-xtask pattern.
//! Run with: `cargo xtask <command>`

mod commands;
mod dirs;
mod utils;

use anyhow::Result;
use clap::Parser;
use commands::{FairPlay, JudgeAddress, ReadGame, VerifySignature};

/// Operator tasks for the chess arbiter
#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Operator tools for the chess arbiter", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// List persisted games or inspect one of them
    ReadGame(ReadGame),

    /// Print the think-time report for a game
    Fairplay(FairPlay),

    /// Derive the judge's ledger address from its private key
    JudgeAddress(JudgeAddress),

    /// Check a stored settlement signature against the judge address
    VerifySignature(VerifySignature),
}

fn main() -> Result<()> {
    // Load .env file if it exists (for RUNTIME_DATA_DIR and the judge key)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Command::ReadGame(cmd) => cmd.execute(),
        Command::Fairplay(cmd) => cmd.execute(),
        Command::JudgeAddress(cmd) => cmd.execute(),
        Command::VerifySignature(cmd) => cmd.execute(),
    }
}
