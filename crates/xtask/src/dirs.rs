//! Directory conventions shared with the arbiter binary.

use std::path::PathBuf;

/// Data directory of the file repository
///
/// `RUNTIME_DATA_DIR` when set, otherwise the platform data directory:
/// - macOS: `~/Library/Application Support/chess-arbiter`
/// - Linux: `~/.local/share/chess-arbiter` (or `$XDG_DATA_HOME/chess-arbiter`)
/// - Windows: `%APPDATA%\chess-arbiter`
pub fn data_dir() -> PathBuf {
    std::env::var_os("RUNTIME_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(runtime::default_data_dir)
}
