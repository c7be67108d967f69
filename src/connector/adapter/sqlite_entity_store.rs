use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::EntityStore;
use crate::domain::{DomainError, Entity, EntityKind};

/// SQLite persistence for the manifest's entity rows.
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityStore {
    pub fn new(db_path: &Path) -> Result<Self, DomainError> {
        let conn = Connection::open(db_path)
            .map_err(|e| DomainError::backend_unavailable(format!("Failed to open database: {}", e)))?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::backend_unavailable(format!("Failed to create in-memory database: {}", e))
        })?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                confidence REAL NOT NULL,
                context TEXT NOT NULL,
                file_path TEXT NOT NULL,
                line_number INTEGER NOT NULL,
                metadata TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entity_file_path ON entities(file_path);
            CREATE INDEX IF NOT EXISTS idx_entity_kind ON entities(kind);
            "#,
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize schema: {}", e)))?;
        debug!("SQLite entities schema initialized");
        Ok(())
    }

    fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let kind_str: String = row.get(2)?;
        let metadata_json: String = row.get(7)?;
        let metadata: BTreeMap<String, Value> =
            serde_json::from_str(&metadata_json).unwrap_or_default();
        Ok(Entity::reconstitute(
            row.get(0)?,
            row.get(1)?,
            EntityKind::parse(&kind_str).unwrap_or(EntityKind::Term),
            row.get::<_, f64>(3)? as f32,
            row.get(4)?,
            row.get(5)?,
            row.get::<_, i64>(6)? as u32,
            metadata,
        ))
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn upsert_batch(&self, entities: &[Entity]) -> Result<(), DomainError> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO entities \
                     (id, name, kind, confidence, context, file_path, line_number, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(|e| DomainError::storage(format!("Failed to prepare upsert: {}", e)))?;
            for entity in entities {
                let metadata_json = serde_json::to_string(entity.metadata())
                    .map_err(|e| DomainError::storage(format!("Failed to encode metadata: {}", e)))?;
                stmt.execute(params![
                    entity.id(),
                    entity.name(),
                    entity.kind().as_str(),
                    entity.confidence() as f64,
                    entity.context(),
                    entity.file_path(),
                    entity.line_number() as i64,
                    metadata_json,
                ])
                .map_err(|e| {
                    DomainError::storage(format!("Failed to upsert entity {}: {}", entity.id(), e))
                })?;
            }
        }
        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;
        debug!("Upserted {} entities", entities.len());
        Ok(())
    }

    async fn delete_by_source(&self, file_path: &str) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute("DELETE FROM entities WHERE file_path = ?1", params![file_path])
            .map_err(|e| DomainError::storage(format!("Failed to delete by source: {}", e)))?;
        debug!("Deleted {} entities for {}", deleted, file_path);
        Ok(deleted as u64)
    }

    async fn find_by_source(&self, file_path: &str) -> Result<Vec<Entity>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, kind, confidence, context, file_path, line_number, metadata \
                 FROM entities WHERE file_path = ?1 ORDER BY line_number",
            )
            .map_err(|e| DomainError::storage(format!("Failed to prepare query: {}", e)))?;
        let entities = stmt
            .query_map(params![file_path], Self::row_to_entity)
            .map_err(|e| DomainError::storage(format!("Failed to query entities: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::storage(format!("Failed to read entity row: {}", e)))?;
        Ok(entities)
    }

    async fn find_by_kind(&self, kind: &str) -> Result<Vec<Entity>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, kind, confidence, context, file_path, line_number, metadata \
                 FROM entities WHERE kind = ?1 ORDER BY file_path, line_number",
            )
            .map_err(|e| DomainError::storage(format!("Failed to prepare query: {}", e)))?;
        let entities = stmt
            .query_map(params![kind], Self::row_to_entity)
            .map_err(|e| DomainError::storage(format!("Failed to query entities: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::storage(format!("Failed to read entity row: {}", e)))?;
        Ok(entities)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))
            .map_err(|e| DomainError::storage(format!("Failed to count entities: {}", e)))?;
        Ok(count as u64)
    }
}
