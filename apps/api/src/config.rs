use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// What `upsert` does with an evaluation payload that cannot be translated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranslationMode {
    /// Store an empty mapping and log a warning.
    #[default]
    Lenient,
    /// Reject the call with a translation error.
    Strict,
}

impl FromStr for TranslationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(TranslationMode::Lenient),
            "strict" => Ok(TranslationMode::Strict),
            other => Err(anyhow!("unknown translation mode '{other}'")),
        }
    }
}

/// How the reconciliation sweep finds duplicate (job, owner) groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcileStrategy {
    /// Aggregate in the database, load only the members of duplicate groups.
    #[default]
    Grouped,
    /// Load every record and group in memory.
    FullScan,
}

impl FromStr for ReconcileStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grouped" => Ok(ReconcileStrategy::Grouped),
            "full_scan" | "full-scan" => Ok(ReconcileStrategy::FullScan),
            other => Err(anyhow!("unknown reconcile strategy '{other}'")),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub translation_mode: TranslationMode,
    pub reconcile_strategy: ReconcileStrategy,
    /// Seconds between background sweeps. `None` disables the scheduler.
    pub reconcile_interval_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: optional_env("PORT")?.unwrap_or(8080),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db_max_connections: optional_env("DB_MAX_CONNECTIONS")?.unwrap_or(10),
            run_migrations: optional_env("RUN_MIGRATIONS")?.unwrap_or(true),
            translation_mode: optional_env("TRANSLATION_MODE")?.unwrap_or_default(),
            reconcile_strategy: optional_env("RECONCILE_STRATEGY")?.unwrap_or_default(),
            reconcile_interval_secs: optional_env::<u64>("RECONCILE_INTERVAL_SECS")?
                .filter(|secs| *secs > 0),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid value for '{key}': {e}")),
        _ => Ok(None),
    }
}
