use crate::error::DocDbError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync file and directory on every persisted collection file.
    Full,
    /// Leave flushing to the OS page cache; faster, loses the last writes on
    /// power failure but never produces a torn file.
    OsBuffered,
}

/// Runtime configuration for a docdb instance.
#[derive(Debug, Clone)]
pub struct DocDbConfig {
    /// Directory holding one `<collection>.json` file per collection.
    pub data_dir: PathBuf,
    /// Directory holding timestamped backup subdirectories.
    pub backup_dir: PathBuf,
    /// Backups older than this many days are removed by pruning.
    pub backup_retention_days: u32,
    pub durability_mode: DurabilityMode,
    /// Pretty-print persisted JSON. Costs bytes, keeps data files diffable.
    pub pretty_json: bool,
}

impl DocDbConfig {
    pub fn new(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
            backup_retention_days: 30,
            durability_mode: DurabilityMode::Full,
            pretty_json: true,
        }
    }

    pub fn production(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            durability_mode: DurabilityMode::Full,
            ..Self::new(data_dir, backup_dir)
        }
    }

    pub fn development(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            durability_mode: DurabilityMode::OsBuffered,
            backup_retention_days: 7,
            ..Self::new(data_dir, backup_dir)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DocDbError> {
        if self.backup_retention_days == 0 {
            return Err(DocDbError::InvalidConfig {
                message: "backup_retention_days must be at least 1".into(),
            });
        }
        if normalize(&self.data_dir) == normalize(&self.backup_dir) {
            return Err(DocDbError::InvalidConfig {
                message: "data_dir and backup_dir must be distinct directories".into(),
            });
        }
        if normalize(&self.backup_dir).starts_with(normalize(&self.data_dir)) {
            return Err(DocDbError::InvalidConfig {
                message: "backup_dir must not live inside data_dir".into(),
            });
        }
        Ok(())
    }
}

// Lexical normalization only; the directories may not exist yet, so
// canonicalize is not an option here.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
