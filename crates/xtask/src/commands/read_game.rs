//! Read and inspect persisted games
//!
//! Without a game id, lists every game with a stored snapshot. With one,
//! prints the latest snapshot and the terminal record if the game finished.

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;

use chess_core::{GameId, GameRecord, TerminalRecord, Timestamp};
use runtime::GameRepository;

use crate::utils::{self, format_clock};

/// Read and inspect persisted games
#[derive(Parser)]
pub struct ReadGame {
    /// Game to inspect; lists all games when omitted
    #[arg(value_name = "GAME_ID")]
    game_id: Option<u64>,

    /// Custom data directory (defaults to platform-specific location)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Status, clocks, result and move list
    Summary,
    /// Full JSON output
    Json,
    /// Pretty-printed debug format
    Debug,
}

impl ReadGame {
    pub fn execute(self) -> Result<()> {
        let repository = utils::open_repository(self.data_dir)?;

        let Some(game_id) = self.game_id.map(GameId) else {
            let games = utils::block_on(repository.list_games())?
                .context("Failed to list games")?;
            if games.is_empty() {
                println!("{}", style("No games stored yet").dim());
                return Ok(());
            }
            println!("{}", style("Stored games:").bold().cyan());
            for game_id in games {
                let record = utils::load_game(&repository, game_id)?;
                match record {
                    Some(record) => println!(
                        "  {:>8}  {:<9}  {:>3} plies",
                        game_id.to_string(),
                        record.status.as_str(),
                        record.plies()
                    ),
                    None => println!("  {:>8}  (unreadable)", game_id.to_string()),
                }
            }
            return Ok(());
        };

        let record = utils::load_game(&repository, game_id)?
            .with_context(|| format!("Game {game_id} not found"))?;
        let terminal = utils::block_on(repository.load_terminal(game_id))?
            .context("Failed to read terminal record")?;

        match self.format {
            OutputFormat::Summary => print_summary(&record, terminal.as_ref()),
            OutputFormat::Json => {
                let json = serde_json::json!({ "snapshot": record, "terminal": terminal });
                let text = serde_json::to_string_pretty(&json)
                    .context("Failed to serialize game to JSON")?;
                println!("{text}");
            }
            OutputFormat::Debug => {
                println!("{record:#?}");
                if let Some(terminal) = terminal {
                    println!("{terminal:#?}");
                }
            }
        }

        Ok(())
    }
}

fn print_summary(record: &GameRecord, terminal: Option<&TerminalRecord>) {
    println!("{}", style(format!("=== Game {} ===", record.game_id)).bold().green());
    println!();

    println!("{}", style("Players:").bold().yellow());
    println!("  White: {} ({})", record.white.id, record.white.address);
    match &record.black {
        Some(black) => println!("  Black: {} ({})", black.id, black.address),
        None => println!("  Black: {}", style("waiting for opponent").dim()),
    }
    println!();

    println!("{}", style("State:").bold().yellow());
    println!("  Status: {}", record.status.as_str());
    println!("  Version: {}", record.version);
    println!("  Plies: {}", record.plies());
    println!("  FEN: {}", record.position.fen());
    let at = record.clock.last_tick().unwrap_or(record.created_at);
    let clock = record.clock.elapsed(at);
    println!(
        "  Clock: white {} / black {} (+{}ms)",
        format_clock(clock.white_ms),
        format_clock(clock.black_ms),
        record.clock.increment_ms()
    );
    if let Some(side) = record.clock.running() {
        println!("  Running: {side}");
    }
    println!();

    if let Some(result) = &record.result {
        println!("{}", style("Result:").bold().yellow());
        println!("  Outcome: {}", result.outcome);
        println!("  Reason: {}", result.reason);
        println!("  Completed: {}", format_timestamp(result.completed_at));
        match terminal {
            Some(_) => println!("  Terminal record: {}", style("stored").green()),
            None => println!("  Terminal record: {}", style("missing").red().bold()),
        }
        println!();
    }

    if !record.moves.is_empty() {
        println!("{}", style("Moves:").bold().yellow());
        for pair in record.moves.chunks(2) {
            let number = pair[0].ply.div_ceil(2);
            let line = pair
                .iter()
                .map(|m| format!("{:<6} {:>6}ms", m.uci, m.think_time_ms))
                .collect::<Vec<_>>()
                .join("   ");
            println!("  {number:>3}. {line}");
        }
        println!();
    }
}

fn format_timestamp(at: Timestamp) -> String {
    i64::try_from(at.as_millis())
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| format!("{} ms", at.as_millis()))
}
