use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, query, query_as, query_scalar};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{NewEntry, OutboxEntry, Status};
use crate::store::{RecordStore, StoreError};

/// Creates and returns a new database connection pool.
pub async fn setup_db_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url())
        .await
}

/// Postgres-backed record store. Leasing and the other transitions are
/// conditional single-row updates keyed on the expected prior status, so
/// concurrent sweepers cannot double-take an entry.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

#[async_trait]
impl RecordStore for PgStore {
    async fn enqueue(&self, new: NewEntry) -> Result<OutboxEntry, StoreError> {
        let result = query_as::<_, OutboxEntry>(
            r#"
            INSERT INTO webhook_outbox
                (id, aggregate_id, sequence, endpoint, payload, status,
                 attempts, next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, NOW(), NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.aggregate_id)
        .bind(new.sequence)
        .bind(&new.endpoint)
        .bind(&new.payload)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(entry) => Ok(entry),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateSequence)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = query_as::<_, OutboxEntry>(
            r#"
            SELECT *
            FROM webhook_outbox
            WHERE status = 'pending'
                AND next_attempt_at <= $1
            ORDER BY aggregate_id, sequence
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn status_of(
        &self,
        aggregate_id: &str,
        sequence: i64,
    ) -> Result<Option<Status>, StoreError> {
        let status = query_scalar::<_, Status>(
            r#"
            SELECT status
            FROM webhook_outbox
            WHERE aggregate_id = $1
                AND sequence = $2
            "#,
        )
        .bind(aggregate_id)
        .bind(sequence)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status)
    }

    async fn lease(&self, id: Uuid) -> Result<Option<OutboxEntry>, StoreError> {
        // The conditional update is the whole locking story: whichever worker
        // flips pending -> delivering first gets the row back, the rest get
        // nothing.
        let leased = query_as::<_, OutboxEntry>(
            r#"
            UPDATE webhook_outbox
            SET status = 'delivering', updated_at = NOW()
            WHERE id = $1
                AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(leased)
    }

    async fn mark_delivered(&self, id: Uuid, status_code: u16) -> Result<(), StoreError> {
        query(
            r#"
            UPDATE webhook_outbox
            SET status = 'delivered',
                attempts = attempts + 1,
                last_status_code = $2,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
                AND status = 'delivering'
            "#,
        )
        .bind(id)
        .bind(status_code as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        query(
            r#"
            UPDATE webhook_outbox
            SET status = 'pending',
                attempts = attempts + 1,
                last_status_code = $2,
                last_error = $3,
                next_attempt_at = $4,
                updated_at = NOW()
            WHERE id = $1
                AND status = 'delivering'
            "#,
        )
        .bind(id)
        .bind(status_code.map(i32::from))
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_dead(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        error: &str,
    ) -> Result<(), StoreError> {
        query(
            r#"
            UPDATE webhook_outbox
            SET status = 'dead',
                attempts = attempts + 1,
                last_status_code = $2,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
                AND status = 'delivering'
            "#,
        )
        .bind(id)
        .bind(status_code.map(i32::from))
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replay(&self, id: Uuid) -> Result<OutboxEntry, StoreError> {
        let replayed = query_as::<_, OutboxEntry>(
            r#"
            UPDATE webhook_outbox
            SET status = 'pending',
                attempts = 0,
                next_attempt_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
                AND status = 'dead'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match replayed {
            Some(entry) => Ok(entry),
            None => {
                // Distinguish a missing entry from a live one.
                let current = self.find(id).await?;
                match current {
                    Some(entry) => Err(StoreError::NotDead(entry.status)),
                    None => Err(StoreError::NotFound),
                }
            }
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<OutboxEntry>, StoreError> {
        let entry = query_as::<_, OutboxEntry>(
            r#"
            SELECT *
            FROM webhook_outbox
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn list(
        &self,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = query_as::<_, OutboxEntry>(
            r#"
            SELECT *
            FROM webhook_outbox
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
