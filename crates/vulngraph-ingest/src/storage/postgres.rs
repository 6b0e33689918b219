//! PostgreSQL storage backend
//!
//! One table per entity type (see `migrations/`). Every table has a text `id`
//! primary key, one column per reference declared as a foreign key, and the
//! full attribute map as JSONB. A batch is written in a single transaction
//! with one multi-row `INSERT ... ON CONFLICT (id) DO NOTHING` per type.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};
use vulngraph_common::{EntityType, NormalizedEntity};

use crate::config::DatabaseConfig;
use crate::error::{ConstraintKind, StorageError};
use crate::framework::storage::{StorageBackend, WriteSummary};

/// Keeps each statement well under the 65535 bind parameter limit.
const ROWS_PER_STATEMENT: usize = 5_000;

/// PostgreSQL-backed entity store
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the entity schema migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Migration failed: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn table(entity_type: EntityType) -> String {
    format!("\"{}\"", entity_type.as_str())
}

/// Map SQLSTATE integrity codes to constraint violations
fn classify(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        let kind = match db.code().as_deref() {
            Some("23505") => Some(ConstraintKind::Unique),
            Some("23503") => Some(ConstraintKind::ForeignKey),
            Some("23502") => Some(ConstraintKind::NotNull),
            Some("23514") => Some(ConstraintKind::Check),
            _ => None,
        };
        if let Some(kind) = kind {
            return StorageError::constraint(kind, db.message());
        }
    }
    StorageError::Database(err)
}

fn insert_statement<'a>(
    entity_type: EntityType,
    rows: &'a [&'a NormalizedEntity],
) -> QueryBuilder<'a, Postgres> {
    let references = entity_type.references();

    let mut builder = QueryBuilder::new(format!("INSERT INTO {} (id", table(entity_type)));
    for reference in references {
        builder.push(", ").push(reference.attribute);
    }
    builder.push(", attributes) ");

    builder.push_values(rows, |mut row, entity| {
        row.push_bind(entity.id.as_str());
        for reference in references {
            row.push_bind(entity.reference_id(reference));
        }
        row.push_bind(Json(&entity.attributes));
    });
    builder.push(" ON CONFLICT (id) DO NOTHING");
    builder
}

#[async_trait]
impl StorageBackend for PgStorage {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn load_known_ids(&self, entity_type: EntityType) -> Result<HashSet<String>, StorageError> {
        let ids: Vec<String> = sqlx::query_scalar(&format!("SELECT id FROM {}", table(entity_type)))
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn bulk_write(&self, batch: &[NormalizedEntity]) -> Result<WriteSummary, StorageError> {
        let mut by_type: BTreeMap<EntityType, Vec<&NormalizedEntity>> = BTreeMap::new();
        for entity in batch {
            by_type.entry(entity.entity_type).or_default().push(entity);
        }

        let mut tx = self.pool.begin().await?;
        let mut summary = WriteSummary::new();

        // BTreeMap order follows declaration order, which lists parents first
        for (entity_type, rows) in &by_type {
            for chunk in rows.chunks(ROWS_PER_STATEMENT) {
                let result = insert_statement(*entity_type, chunk)
                    .build()
                    .execute(&mut *tx)
                    .await
                    .map_err(classify)?;
                summary.record(*entity_type, result.rows_affected() as usize);
            }
        }

        tx.commit().await.map_err(classify)?;
        debug!(rows = batch.len(), written = summary.total(), "Batch committed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_lists_reference_columns() {
        let entity = NormalizedEntity::new(EntityType::CpeMatch, "m1")
            .with("cpe_id", "c1")
            .with("node_id", "n1");
        let rows = [&entity];
        let sql = insert_statement(EntityType::CpeMatch, &rows).into_sql();
        assert_eq!(
            sql,
            "INSERT INTO \"cpe_match\" (id, cpe_id, node_id, attributes) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING"
        );
    }

    #[test]
    fn test_root_table_has_only_id_and_attributes() {
        let entity = NormalizedEntity::new(EntityType::Vendor, "v1");
        let rows = [&entity, &entity];
        let sql = insert_statement(EntityType::Vendor, &rows).into_sql();
        assert!(sql.starts_with("INSERT INTO \"vendor\" (id, attributes) VALUES ($1, $2), ($3, $4)"));
    }
}
