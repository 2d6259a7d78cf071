use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryOrder,
    Schema,
};

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{ActiveModel, Column, Entity};
use crate::storage::storage_trait::{key_segments, Storage};

/// SQLite-backed store through SeaORM.
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    /// Opens (creating if needed) the SQLite file at `path` and ensures the
    /// `kv_entries` table exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create database dir {}: {}", parent.display(), e);
                StorageError::WriteFailed
            })?;
        }
        let url = format!("sqlite://{}?mode=rwc", path.display());
        Self::connect(&url).await
    }

    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let db = Database::connect(url).await.map_err(|e| {
            error!("Failed to connect to {}: {}", url, e);
            StorageError::ConnectionFailed
        })?;

        let backend = db.get_database_backend();
        let mut create = Schema::new(backend).create_table_from_entity(Entity);
        create.if_not_exists();
        db.execute(backend.build(&create)).await.map_err(|e| {
            error!("Failed to create kv_entries table: {}", e);
            StorageError::WriteFailed
        })?;

        info!("DatabaseStorage connected to {}", url);
        Ok(Self { db })
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        key_segments(key)?;
        let entry = ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now().to_rfc3339()),
        };
        Entity::insert(entry)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .update_columns([Column::Value, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to upsert {}: {}", key, e);
                StorageError::WriteFailed
            })?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        key_segments(key)?;
        let found = Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to read {}: {}", key, e);
                StorageError::ReadFailed
            })?;
        Ok(found.map(|model| model.value))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        key_segments(key)?;
        let result = Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to delete {}: {}", key, e);
                StorageError::WriteFailed
            })?;
        debug!("Removed {} ({} row(s))", key, result.rows_affected);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let models = Entity::find()
            .order_by_asc(Column::Key)
            .all(&self.db)
            .await
            .map_err(|e| {
                error!("Failed to list keys: {}", e);
                StorageError::ReadFailed
            })?;
        Ok(models.into_iter().map(|model| model.key).collect())
    }
}
