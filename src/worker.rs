use chrono::{Duration, Utc};
use tracing::{Span, debug, info, instrument, warn};

use crate::backoff::Backoff;
use crate::config::Config;
use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::models::OutboxEntry;
use crate::ordering;
use crate::signer;
use crate::store::{RecordStore, StoreError};

/// Immutable knobs for the tick loop, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub signing_secret: String,
    pub max_attempts: i32,
    pub batch_size: i64,
    pub backoff: Backoff,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            signing_secret: config.signing_secret().to_string(),
            max_attempts: config.max_attempts,
            batch_size: config.batch_size,
            backoff: Backoff {
                base_ms: config.backoff_base_ms,
                factor: config.backoff_factor,
                max_ms: config.backoff_max_ms,
            },
        }
    }
}

/// What one tick did, for the caller's log line and for tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub selected: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead: usize,
    pub blocked: usize,
    pub raced: usize,
}

/// Runs one bounded sweep: select due entries, gate them, lease, deliver,
/// and apply the resulting transition.
///
/// The ordering gate is evaluated against the state at selection time, so a
/// successor whose predecessor is delivered during this tick becomes
/// eligible on the next one. Per-entry failures are contained in that
/// entry's record and never abort the rest of the batch.
#[instrument(skip_all, fields(candidates = 0))]
pub async fn run_tick(
    store: &dyn RecordStore,
    client: &dyn DeliveryClient,
    config: &WorkerConfig,
) -> Result<TickReport, StoreError> {
    let now = Utc::now();
    let candidates = store.due_entries(now, config.batch_size).await?;

    let mut report = TickReport {
        selected: candidates.len(),
        ..TickReport::default()
    };
    if candidates.is_empty() {
        debug!("No due entries found.");
        return Ok(report);
    }
    Span::current().record("candidates", candidates.len());

    // Gate pass first: decide eligibility for the whole batch before any
    // delivery mutates predecessor state.
    let mut eligible = Vec::with_capacity(candidates.len());
    for entry in candidates {
        let predecessor = if entry.sequence == 0 {
            None
        } else {
            store.status_of(&entry.aggregate_id, entry.sequence - 1).await?
        };
        if ordering::is_eligible(predecessor) {
            eligible.push(entry);
        } else {
            // Not an error, not an attempt; re-evaluated next tick.
            debug!(
                aggregate_id = %entry.aggregate_id,
                sequence = entry.sequence,
                "Entry blocked behind an unresolved predecessor."
            );
            report.blocked += 1;
        }
    }

    for entry in eligible {
        match store.lease(entry.id).await {
            Ok(Some(leased)) => attempt_delivery(store, client, config, leased, &mut report).await,
            Ok(None) => {
                // Another worker took it between selection and lease.
                debug!(
                    aggregate_id = %entry.aggregate_id,
                    sequence = entry.sequence,
                    "Lost the lease race, skipping."
                );
                report.raced += 1;
            }
            Err(e) => {
                warn!(
                    aggregate_id = %entry.aggregate_id,
                    sequence = entry.sequence,
                    "Failed to lease entry: {e}. It stays pending."
                );
            }
        }
    }

    Ok(report)
}

/// One signed delivery attempt for a leased entry plus the transition that
/// records its outcome.
async fn attempt_delivery(
    store: &dyn RecordStore,
    client: &dyn DeliveryClient,
    config: &WorkerConfig,
    entry: OutboxEntry,
    report: &mut TickReport,
) {
    let body = serde_json::to_vec(&entry.payload)
        .expect("serializing an in-memory JSON value cannot fail");
    let timestamp_ms = Utc::now().timestamp_millis();
    let signature = signer::signature_header(&config.signing_secret, timestamp_ms, &body);

    let outcome = client.deliver(&entry.endpoint, &body, &signature).await;
    let attempt = entry.attempts + 1;

    let applied = match outcome {
        DeliveryOutcome::Delivered { status } => {
            info!(
                aggregate_id = %entry.aggregate_id,
                sequence = entry.sequence,
                attempt,
                code = status,
                outcome = "delivered",
                "Webhook delivered."
            );
            report.delivered += 1;
            store.mark_delivered(entry.id, status).await
        }
        DeliveryOutcome::Retryable { status, error, retry_after_ms } if attempt < config.max_attempts => {
            let delay_ms = config.backoff.next_delay(entry.attempts, retry_after_ms);
            let next_attempt_at = Utc::now() + Duration::milliseconds(delay_ms as i64);
            info!(
                aggregate_id = %entry.aggregate_id,
                sequence = entry.sequence,
                attempt,
                code = status,
                outcome = "retry",
                next_delay_ms = delay_ms,
                "Delivery failed, scheduling retry: {error}"
            );
            report.retried += 1;
            store.mark_retry(entry.id, status, &error, next_attempt_at).await
        }
        DeliveryOutcome::Retryable { status, error, .. } => {
            warn!(
                aggregate_id = %entry.aggregate_id,
                sequence = entry.sequence,
                attempt,
                code = status,
                outcome = "dead",
                "Retry budget exhausted, entry is dead: {error}"
            );
            report.dead += 1;
            store.mark_dead(entry.id, status, &error).await
        }
        DeliveryOutcome::Permanent { status, error } => {
            warn!(
                aggregate_id = %entry.aggregate_id,
                sequence = entry.sequence,
                attempt,
                code = status,
                outcome = "dead",
                "Non-retryable response, entry is dead: {error}"
            );
            report.dead += 1;
            store.mark_dead(entry.id, Some(status), &error).await
        }
    };

    if let Err(e) = applied {
        warn!(
            aggregate_id = %entry.aggregate_id,
            sequence = entry.sequence,
            "Failed to record delivery outcome: {e}. The attempt WILL be repeated."
        );
    }
}
