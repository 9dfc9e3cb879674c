//! Database backup utilities

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Copy the database file into `backup_dir` under a timestamped name and
/// return the path of the copy. The directory is created if missing.
pub fn backup_database(db_path: &Path, backup_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(backup_dir)?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M");
    let backup_path = backup_dir.join(format!("{stamp}.db"));
    std::fs::copy(db_path, &backup_path)?;

    tracing::info!(path = %backup_path.display(), "database backup written");
    Ok(backup_path)
}
