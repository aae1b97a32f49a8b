//! Point-in-time export, validated import, and safe restore of the store.
//!
//! Both import and restore run a complete, non-short-circuiting validation
//! pass before any persisted state changes, so a rejected operation leaves
//! the system byte-for-byte unchanged. Restore additionally snapshots the
//! live data first and returns that snapshot's name, so even a restore of
//! structurally valid but semantically wrong data can be undone.

use crate::catalog::SchemaCatalog;
use crate::config::{DocDbConfig, DurabilityMode};
use crate::error::DocDbError;
use crate::persist;
use crate::store::document::Document;
use crate::store::{DocStore, MaintenanceGuard};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const BACKUP_PREFIX: &str = "backup_";
/// Prefix for the safety snapshot taken immediately before a restore.
pub const SAFETY_PREFIX: &str = "pre-restore_";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

/// Collection name → record sequence, as exchanged with export/import.
pub type BackupBundle = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct BackupManager {
    store: Arc<DocStore>,
    catalog: SchemaCatalog,
    backup_dir: PathBuf,
    retention_days: u32,
    durability: DurabilityMode,
    pretty_json: bool,
}

impl BackupManager {
    pub fn new(store: Arc<DocStore>, catalog: SchemaCatalog, config: &DocDbConfig) -> Self {
        Self {
            store,
            catalog,
            backup_dir: config.backup_dir.clone(),
            retention_days: config.backup_retention_days,
            durability: config.durability_mode,
            pretty_json: config.pretty_json,
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Flushes the store, then copies every persisted collection file into
    /// a new timestamped backup directory.
    pub async fn create_backup(&self) -> Result<BackupInfo, DocDbError> {
        let guard = self.store.lock_maintenance().await;
        self.store.flush_locked(&guard)?;
        let backup = self.snapshot_locked(&guard, BACKUP_PREFIX)?;
        info!(
            backup = %backup.name,
            size_bytes = backup.size_bytes,
            "backup created"
        );
        Ok(backup)
    }

    /// Enumerates backup directories, newest first. Creation time is parsed
    /// from the directory name, falling back to filesystem metadata for
    /// names that carry no timestamp (e.g. named imports).
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, DocDbError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let created_at = match parse_backup_created_at(&name) {
                Some(ts) => ts,
                None => match entry.metadata().and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(e) => {
                        warn!(backup = %name, error = %e, "skipping unreadable backup entry");
                        continue;
                    }
                },
            };
            let size_bytes = persist::dir_size_bytes(&entry.path()).unwrap_or_else(|e| {
                warn!(backup = %name, error = %e, "could not size backup");
                0
            });
            backups.push(BackupInfo {
                name,
                size_bytes,
                created_at,
            });
        }
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    /// Resolves a backup name to its directory. Names containing path
    /// separators or traversal sequences yield `None`, same as a missing
    /// backup, so a caller cannot distinguish an attack from a miss.
    pub fn backup_path(&self, name: &str) -> Option<PathBuf> {
        if !is_safe_backup_name(name) {
            return None;
        }
        let path = self.backup_dir.join(name);
        path.is_dir().then_some(path)
    }

    /// Reads every file in a named backup into a single bundle for
    /// export/download.
    pub fn read_bundle(&self, name: &str) -> Result<BackupBundle, DocDbError> {
        let dir = self.backup_path(name).ok_or_else(|| DocDbError::BackupNotFound {
            name: name.to_string(),
        })?;
        read_bundle_dir(&dir)
    }

    /// Validates every record in every collection before writing anything.
    /// On any failure the import aborts entirely and the full issue list is
    /// returned; on success one JSON file per collection lands in a new
    /// backup directory.
    pub fn import_backup(
        &self,
        collections: &BackupBundle,
        filename: Option<&str>,
    ) -> Result<BackupInfo, DocDbError> {
        let errors = self.catalog.validate_collections(collections);
        if !errors.is_empty() {
            return Err(DocDbError::ImportRejected { errors });
        }

        let mut files: Vec<(String, Vec<Document>)> = Vec::new();
        for (raw_name, records) in collections {
            let Some(collection) = sanitize_collection_name(raw_name) else {
                warn!(collection = %raw_name, "dropping collection with unusable name");
                continue;
            };
            let docs = records
                .iter()
                .map(|r| r.as_object().expect("validated as object").clone())
                .collect();
            files.push((collection, docs));
        }
        if files.is_empty() {
            return Err(DocDbError::Validation(
                "import contains no usable collections".into(),
            ));
        }

        let name = filename
            .and_then(sanitize_backup_name)
            .unwrap_or_else(|| timestamp_name(BACKUP_PREFIX));
        let target = self.backup_dir.join(&name);
        if target.exists() {
            return Err(DocDbError::Validation(format!(
                "backup '{name}' already exists"
            )));
        }
        fs::create_dir_all(&target)?;
        for (collection, docs) in &files {
            if let Err(err) = persist::write_collection_atomic(
                &target,
                collection,
                docs,
                self.durability,
                self.pretty_json,
            ) {
                // A half-written directory must never surface as a backup.
                if let Err(cleanup) = fs::remove_dir_all(&target) {
                    warn!(backup = %name, error = %cleanup, "could not remove partial import");
                }
                return Err(err);
            }
        }
        let info = BackupInfo {
            name,
            size_bytes: persist::dir_size_bytes(&target)?,
            created_at: Utc::now(),
        };
        info!(
            backup = %info.name,
            collections = files.len(),
            "backup imported"
        );
        Ok(info)
    }

    /// Validates the target backup in full, snapshots the live data, copies
    /// the backup's files over the data directory and reloads the store.
    /// Returns the safety snapshot's name so the restore can be undone.
    pub async fn restore_backup(&self, name: &str) -> Result<String, DocDbError> {
        let dir = self.backup_path(name).ok_or_else(|| DocDbError::BackupNotFound {
            name: name.to_string(),
        })?;
        let bundle = read_bundle_dir(&dir)?;
        let errors = self.catalog.validate_collections(&bundle);
        if !errors.is_empty() {
            return Err(DocDbError::ImportRejected { errors });
        }

        // Everything from the safety snapshot to the reload happens under
        // the maintenance lock: no flush can interleave and no reader can
        // observe a store reloaded from a half-copied backup.
        let guard = self.store.lock_maintenance().await;
        self.store.flush_locked(&guard)?;
        let safety = self.snapshot_locked(&guard, SAFETY_PREFIX)?;
        persist::copy_collection_files(&dir, self.store.data_dir())?;
        self.store.reload_locked(&guard)?;
        info!(
            backup = %name,
            safety_snapshot = %safety.name,
            "restore complete"
        );
        Ok(safety.name)
    }

    /// Removes a named backup. `Ok(false)` when it does not exist.
    pub fn delete_backup(&self, name: &str) -> Result<bool, DocDbError> {
        let Some(path) = self.backup_path(name) else {
            return Ok(false);
        };
        fs::remove_dir_all(path)?;
        info!(backup = %name, "backup deleted");
        Ok(true)
    }

    /// Removes every backup older than the retention window. Best effort:
    /// a failure on one backup must not block pruning of the rest.
    pub fn prune_old_backups(&self) -> Result<Vec<String>, DocDbError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let mut removed = Vec::new();
        for backup in self.list_backups()? {
            if backup.created_at >= cutoff {
                continue;
            }
            match fs::remove_dir_all(self.backup_dir.join(&backup.name)) {
                Ok(()) => removed.push(backup.name),
                Err(e) => {
                    warn!(backup = %backup.name, error = %e, "could not prune backup");
                }
            }
        }
        if !removed.is_empty() {
            info!(pruned = removed.len(), "old backups pruned");
        }
        Ok(removed)
    }

    /// Copies the current collection files into a fresh directory named
    /// `<prefix><timestamp>`. Caller holds the maintenance lock, so the
    /// files cannot change mid-copy.
    fn snapshot_locked(
        &self,
        _guard: &MaintenanceGuard<'_>,
        prefix: &str,
    ) -> Result<BackupInfo, DocDbError> {
        let created_at = Utc::now();
        let name = format!("{prefix}{}", created_at.format(TIMESTAMP_FORMAT));
        let target = self.backup_dir.join(&name);
        fs::create_dir_all(&self.backup_dir)?;
        fs::create_dir(&target)?;
        persist::copy_collection_files(self.store.data_dir(), &target)?;
        Ok(BackupInfo {
            name,
            size_bytes: persist::dir_size_bytes(&target)?,
            created_at,
        })
    }
}

fn timestamp_name(prefix: &str) -> String {
    format!("{prefix}{}", Utc::now().format(TIMESTAMP_FORMAT))
}

fn parse_backup_created_at(name: &str) -> Option<DateTime<Utc>> {
    let ts = name
        .strip_prefix(BACKUP_PREFIX)
        .or_else(|| name.strip_prefix(SAFETY_PREFIX))?;
    let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Backup names may only contain alphanumerics, `-`, `_` and `.`; `..` is
/// rejected outright. Path separators never pass the charset.
fn is_safe_backup_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Keeps alphanumerics, hyphens and underscores; `None` when nothing
/// usable remains.
fn sanitize_collection_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn sanitize_backup_name(name: &str) -> Option<String> {
    sanitize_collection_name(name)
}

fn read_bundle_dir(dir: &Path) -> Result<BackupBundle, DocDbError> {
    let mut bundle = BackupBundle::new();
    for (collection, path) in persist::collection_files(dir)? {
        let bytes = fs::read(&path)?;
        let records: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|e| DocDbError::Decode(format!("{}: {e}", path.display())))?;
        bundle.insert(collection, records);
    }
    Ok(bundle)
}
