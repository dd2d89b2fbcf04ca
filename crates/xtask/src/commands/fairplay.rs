//! Think-time report for a finished game

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;

use chess_core::fairplay::analyze_game;
use chess_core::{FairPlayPolicy, FairPlayReport, GameId, Risk};

use crate::utils;

/// Print the advisory think-time report for a finished game
#[derive(Parser)]
pub struct FairPlay {
    #[arg(value_name = "GAME_ID")]
    game_id: u64,

    /// Custom data directory (defaults to platform-specific location)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Moves a side must play before any signal is raised
    #[arg(long, value_name = "N")]
    min_moves: Option<usize>,
}

impl FairPlay {
    pub fn execute(self) -> Result<()> {
        let repository = utils::open_repository(self.data_dir)?;
        let game_id = GameId(self.game_id);
        let record = utils::load_terminal(&repository, game_id)?;

        let mut policy = FairPlayPolicy::default();
        if let Some(min_moves) = self.min_moves {
            policy.min_moves = min_moves;
        }
        let analysis = analyze_game(&policy, &record);

        if self.json {
            let text = serde_json::to_string_pretty(&analysis)
                .context("Failed to serialize report to JSON")?;
            println!("{text}");
            return Ok(());
        }

        println!("{}", style(format!("=== Fair play: game {game_id} ===")).bold().green());
        println!("Outcome: {} ({})", record.outcome, record.reason);
        println!();
        print_report(&format!("White ({})", record.white.id), &analysis.white);
        print_report(&format!("Black ({})", record.black.id), &analysis.black);
        print_report("Overall", &analysis.overall);
        println!("Highest risk: {}", styled_risk(analysis.max_risk()));

        Ok(())
    }
}

fn print_report(title: &str, report: &FairPlayReport) {
    println!("{}", style(title).bold().yellow());
    println!("  Moves: {}", report.move_count);
    println!("  Average think time: {:.0}ms", report.average_ms);
    println!("  Std deviation: {:.0}ms", report.stddev_ms);
    println!("  Suspicion score: {:.2}", report.suspicion_score);
    println!("  Risk: {}", styled_risk(report.risk));
    for signal in &report.signals {
        println!("  {} {}", style("!").red().bold(), signal);
    }
    println!();
}

fn styled_risk(risk: Risk) -> console::StyledObject<Risk> {
    match risk {
        Risk::High => style(risk).red().bold(),
        Risk::Medium => style(risk).yellow(),
        Risk::Low => style(risk).green(),
        Risk::Unknown => style(risk).dim(),
    }
}
