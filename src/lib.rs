pub mod backup;
pub mod catalog;
pub mod config;
pub mod error;
pub mod persist;
pub mod repository;
pub mod store;

pub use crate::backup::{BackupBundle, BackupInfo, BackupManager};
pub use crate::catalog::{CollectionSchema, FieldKind, SchemaCatalog};
pub use crate::config::{DocDbConfig, DurabilityMode};
pub use crate::error::{DocDbError, DocDbErrorCode, ValidationIssue};
pub use crate::repository::{Entity, Repository, Stored};
pub use crate::store::document::Document;
pub use crate::store::DocStore;

use std::sync::Arc;
use tracing::info;

/// An opened docdb instance: one explicit store plus its backup manager.
///
/// Constructed once at startup and passed by reference into collaborators;
/// there is deliberately no process-global instance, so tests can run
/// isolated stores side by side.
#[derive(Debug)]
pub struct DocDb {
    store: Arc<DocStore>,
    backups: BackupManager,
}

impl DocDb {
    /// Opens with the built-in CRM schema catalog.
    pub fn open(config: DocDbConfig) -> Result<Self, DocDbError> {
        Self::open_with_catalog(config, SchemaCatalog::crm_default())
    }

    pub fn open_with_catalog(
        config: DocDbConfig,
        catalog: SchemaCatalog,
    ) -> Result<Self, DocDbError> {
        config.validate()?;
        info!(
            data_dir = %config.data_dir.display(),
            backup_dir = %config.backup_dir.display(),
            backup_retention_days = config.backup_retention_days,
            durability_mode = ?config.durability_mode,
            pretty_json = config.pretty_json,
            "docdb config"
        );
        let store = Arc::new(DocStore::open(&config)?);
        let backups = BackupManager::new(Arc::clone(&store), catalog, &config);
        Ok(Self { store, backups })
    }

    pub fn store(&self) -> &Arc<DocStore> {
        &self.store
    }

    /// Typed view over one collection.
    pub fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.store))
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub async fn flush(&self) -> Result<usize, DocDbError> {
        self.store.flush().await
    }

    /// Flushes outstanding mutations; call before process exit.
    pub async fn shutdown(self) -> Result<(), DocDbError> {
        let flushed = self.store.flush().await?;
        info!(collections = flushed, "docdb shut down");
        Ok(())
    }
}
