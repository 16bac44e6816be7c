use rand::Rng;

/// Retry delay schedule. Pure; the worker owns the only clock.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            factor: 2.0,
            max_ms: 300_000,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt, in milliseconds.
    ///
    /// `attempt_count` is the number of attempts already resolved. A server
    /// supplied retry-after hint takes precedence over the exponential
    /// schedule and is clamped to `max_ms` but never jittered; the computed
    /// delay is perturbed within +/-10% so correlated entries do not retry
    /// in lockstep.
    pub fn next_delay(&self, attempt_count: i32, retry_after_ms: Option<u64>) -> u64 {
        if let Some(hint) = retry_after_ms {
            return hint.min(self.max_ms);
        }

        let exponent = attempt_count.max(0) as f64;
        let nominal = (self.base_ms as f64) * self.factor.powf(exponent);
        let nominal = nominal.min(self.max_ms as f64);

        let jitter = rand::thread_rng().gen_range(-0.10..=0.10);
        (nominal * (1.0 + jitter)).round().max(0.0) as u64
    }

    /// Nominal (un-jittered) delay for a given attempt count.
    pub fn nominal_delay(&self, attempt_count: i32) -> u64 {
        let exponent = attempt_count.max(0) as f64;
        let nominal = (self.base_ms as f64) * self.factor.powf(exponent);
        nominal.min(self.max_ms as f64) as u64
    }
}
