use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewEntry, OutboxEntry, Status};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an entry with that (aggregate_id, sequence) already exists")]
    DuplicateSequence,
    #[error("entry not found")]
    NotFound,
    #[error("replay applies only to dead entries; entry is {}", .0.as_str())]
    NotDead(Status),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Durable table of outbox entries.
///
/// The store owns all mutable delivery state (status, attempt counts,
/// schedules); the worker reads fresh each tick and holds nothing across
/// ticks. `lease` is the concurrency-safety obligation: an atomic
/// `pending -> delivering` conditional transition, so two workers can never
/// both take the same entry.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates a pending entry eligible immediately. Rejects duplicate
    /// `(aggregate_id, sequence)` pairs with [`StoreError::DuplicateSequence`].
    async fn enqueue(&self, new: NewEntry) -> Result<OutboxEntry, StoreError>;

    /// Pending entries with `next_attempt_at <= now`, ordered by
    /// `(aggregate_id, sequence)`, at most `limit` of them.
    async fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Status of `(aggregate_id, sequence)`, or `None` when no such entry exists.
    async fn status_of(
        &self,
        aggregate_id: &str,
        sequence: i64,
    ) -> Result<Option<Status>, StoreError>;

    /// Atomically transitions `pending -> delivering`. Returns `None` when the
    /// entry is no longer pending (another worker won the race).
    async fn lease(&self, id: Uuid) -> Result<Option<OutboxEntry>, StoreError>;

    /// `delivering -> delivered`: records the 2xx code, clears the error,
    /// counts the attempt.
    async fn mark_delivered(&self, id: Uuid, status_code: u16) -> Result<(), StoreError>;

    /// `delivering -> pending`: counts the attempt, records code/error, and
    /// schedules the next attempt.
    async fn mark_retry(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `delivering -> dead`: counts the attempt and records the final code/error.
    async fn mark_dead(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// `dead -> pending`: resets attempts to 0 and makes the entry eligible
    /// now. Any other starting status is rejected with [`StoreError::NotDead`].
    async fn replay(&self, id: Uuid) -> Result<OutboxEntry, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<OutboxEntry>, StoreError>;

    /// Read-only listing, optionally filtered by status, newest first.
    async fn list(
        &self,
        status: Option<Status>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError>;
}
