use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub signing_secret: Option<String>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_sweep_interval() -> u64 {
    5000 // Default to 5 seconds
}

fn default_batch_size() -> i64 {
    50
}

fn default_max_attempts() -> i32 {
    10
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    300_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_request_timeout() -> u64 {
    5000
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;

        // A missing secret or database is fatal at startup, never per-attempt.
        if config.database_url.is_none() {
            return Err(envy::Error::MissingValue("DATABASE_URL"));
        }
        if config.signing_secret.is_none() {
            return Err(envy::Error::MissingValue("SIGNING_SECRET"));
        }

        Ok(config)
    }

    /// Returns the database URL.
    ///
    /// # Panics
    /// Panics if the database_url is not set. This should only be
    /// called after `load()` which validates it.
    pub fn database_url(&self) -> &str {
        self.database_url
            .as_deref()
            .expect("DATABASE_URL is not set")
    }

    /// Returns the webhook signing secret.
    ///
    /// # Panics
    /// Panics if the signing_secret is not set. This should only be
    /// called after `load()` which validates it.
    pub fn signing_secret(&self) -> &str {
        self.signing_secret
            .as_deref()
            .expect("SIGNING_SECRET is not set")
    }
}
