use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use chrono::TimeDelta;

use crate::{aggregator::HistorySettings, alerts::AlertThresholds};

/// Ceiling for `HISTORY_MAX_HOURS` (ten years).
const MAX_HISTORY_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Upper bound on pooled Postgres connections
    pub db_max_connections: u32,
    pub history: HistorySettings,
    pub thresholds: AlertThresholds,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        let bucket_secs: i64 = env.parsed("HISTORY_BUCKET_SECS", "60")?;
        let history = HistorySettings {
            default_hours: env.parsed("HISTORY_DEFAULT_HOURS", "24")?,
            max_hours: env.parsed("HISTORY_MAX_HOURS", "8760")?,
            bucket_width: TimeDelta::try_seconds(bucket_secs)
                .context("HISTORY_BUCKET_SECS is out of range")?,
            max_buckets: env.parsed("HISTORY_MAX_BUCKETS", "100")?,
        };
        ensure!(
            (1..=MAX_HISTORY_HOURS).contains(&history.max_hours),
            "HISTORY_MAX_HOURS must be between 1 and {MAX_HISTORY_HOURS}"
        );
        ensure!(
            (1..=history.max_hours).contains(&history.default_hours),
            "HISTORY_DEFAULT_HOURS must be between 1 and HISTORY_MAX_HOURS"
        );
        ensure!(
            history.bucket_width > TimeDelta::zero(),
            "HISTORY_BUCKET_SECS must be positive"
        );
        ensure!(history.max_buckets > 0, "HISTORY_MAX_BUCKETS must be positive");

        let thresholds = AlertThresholds {
            overvoltage_v: env.parsed("ALERT_OVERVOLTAGE_V", "250")?,
            undervoltage_v: env.parsed("ALERT_UNDERVOLTAGE_V", "200")?,
            overcurrent_a: env.parsed("ALERT_OVERCURRENT_A", "16")?,
            overpower_tolerance: env.parsed("ALERT_OVERPOWER_TOLERANCE", "1.2")?,
        };
        ensure!(
            thresholds.undervoltage_v < thresholds.overvoltage_v,
            "ALERT_UNDERVOLTAGE_V must be below ALERT_OVERVOLTAGE_V"
        );

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            server_host: env.optional("SERVER_HOST", "0.0.0.0"),
            server_port: env.parsed("SERVER_PORT", "8080")?,
            db_max_connections: env.parsed("DB_MAX_CONNECTIONS", "10")?,
            history,
            thresholds,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn required(&self, key: &str) -> Result<String> {
        (self.0)(key).with_context(|| format!("missing required env var: {key}"))
    }

    fn optional(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_owned())
    }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.optional(key, default)
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value"))
    }
}
