//! Postgres observation store
//!
//! The table lives at `"<schema>"."<table>"` with the columns declared in
//! [`crate::schema`]. Appends use chunked multi-row INSERTs inside a single
//! transaction per call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, instrument, warn};

use super::{ObservationStore, StoreResult};
use crate::config::SyncConfig;
use crate::models::ObservationRow;
use crate::schema::{column_definitions, column_list, quote_ident};

pub struct PgObservationStore {
    pool: PgPool,
    schema: String,
    table: String,
    chunk_size: usize,
}

impl PgObservationStore {
    pub fn new(pool: PgPool, schema: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            pool,
            schema: schema.into(),
            table: config.table.clone(),
            chunk_size: config.insert_chunk_size.max(1),
        }
    }

    /// Open a pool for `database_url` sized by the config
    pub async fn connect(
        database_url: &str,
        schema: impl Into<String>,
        config: &SyncConfig,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, schema, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `"schema"."table"`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    async fn insert_chunks(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[ObservationRow],
    ) -> StoreResult<u64> {
        let mut written = 0;
        let prefix = format!("INSERT INTO {} ({}) ", self.qualified_table(), column_list());

        for chunk in rows.chunks(self.chunk_size) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.timestamp)
                    .push_bind(row.value)
                    .push_bind(&row.approval)
                    .push_bind(&row.entity_id);
            });

            let result = builder.build().execute(&mut **tx).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    fn describe(&self) -> String {
        format!("postgres table {}", self.qualified_table())
    }

    #[instrument(skip(self), fields(table = %self.qualified_table()))]
    async fn reset_table(&self) -> StoreResult<()> {
        let table = self.qualified_table();
        let index = quote_ident(&format!("{}_location_time_idx", self.table));

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE {table} ({})", column_definitions()))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE INDEX {index} ON {table} ({}, {})",
            quote_ident("myLocation"),
            quote_ident("Time")
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        warn!("Observation table dropped and recreated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn existing_timestamps(
        &self,
        entity_id: &str,
        since: NaiveDateTime,
    ) -> StoreResult<Vec<NaiveDateTime>> {
        let sql = format!(
            r#"SELECT "Time" FROM {} WHERE "myLocation" = $1 AND "Time" >= $2 ORDER BY "Time""#,
            self.qualified_table()
        );

        let timestamps: Vec<NaiveDateTime> = sqlx::query_scalar(&sql)
            .bind(entity_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        debug!(existing = timestamps.len(), "Loaded existing timestamps");
        Ok(timestamps)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn append(&self, rows: &[ObservationRow]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        match self.insert_chunks(&mut tx, rows).await {
            Ok(written) => {
                tx.commit().await?;
                info!(written, "Committed observations");
                Ok(written)
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            },
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Connection pool closed");
    }
}
