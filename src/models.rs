use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Delivery lifecycle of an outbox entry.
///
/// `pending -> delivering -> {delivered | pending | dead}`, with
/// `dead -> pending` only through an explicit replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Delivering,
    Delivered,
    Dead,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Delivering => "delivering",
            Status::Delivered => "delivered",
            Status::Dead => "dead",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub aggregate_id: String,
    pub sequence: i64,
    pub endpoint: String,
    pub payload: serde_json::Value,
    pub status: Status,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enqueue request body; `(aggregate_id, sequence)` is the only dedup key.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    pub aggregate_id: String,
    pub sequence: i64,
    pub endpoint: String,
    pub payload: serde_json::Value,
}
