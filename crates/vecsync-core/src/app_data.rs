//! Where vecsync looks for its own config file.
//!
//! Documents stay wherever the config points. Only `vecsync.toml` lives here.

use std::path::PathBuf;

/// Returns the per-user directory holding `vecsync.toml`.
/// On Linux: `~/.local/share/vecsync/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("dev", "vecsync", "vecsync")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
