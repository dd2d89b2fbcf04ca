//! Utility functions for xtask commands

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chess_core::{GameId, GameRecord, TerminalRecord};
use runtime::{FileRepository, GameRepository};

use crate::dirs;

/// Run an async repository call to completion.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Open the file repository under `data_dir`, or the default location.
pub fn open_repository(data_dir: Option<PathBuf>) -> Result<FileRepository> {
    let data_dir = data_dir.unwrap_or_else(dirs::data_dir);
    if !data_dir.exists() {
        anyhow::bail!(
            "Data directory does not exist: {}\n\
             Run the arbiter first, or pass --data-dir.",
            data_dir.display()
        );
    }
    FileRepository::new(&data_dir)
        .with_context(|| format!("Failed to open repository at {}", data_dir.display()))
}

pub fn load_game(repository: &FileRepository, game_id: GameId) -> Result<Option<GameRecord>> {
    block_on(repository.load_game(game_id))?
        .with_context(|| format!("Failed to read snapshot of game {game_id}"))
}

pub fn load_terminal(repository: &FileRepository, game_id: GameId) -> Result<TerminalRecord> {
    block_on(repository.load_terminal(game_id))?
        .with_context(|| format!("Failed to read terminal record of game {game_id}"))?
        .with_context(|| format!("Game {game_id} has no terminal record (still in progress?)"))
}

/// Format milliseconds as `m:ss.t`.
pub fn format_clock(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let tenths = (ms % 1_000) / 100;
    format!("{minutes}:{seconds:02}.{tenths}")
}
