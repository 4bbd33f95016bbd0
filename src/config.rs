//! Runtime configuration, read from the environment once at startup.

use std::env;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::expiration::{DEFAULT_THRESHOLD_DAYS, ExpirationPolicy};

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_URL: &str = "sqlite:cert-expiry.db?mode=rwc";

const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;

/// One hour; expirations move at most once a day.
const DEFAULT_CACHE_SECONDS: u32 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub policy: ExpirationPolicy,
    pub source_timeout: Duration,
    pub cache_seconds: u32,

    /// Remote activity indexer. When unset the local SQLite activity index is used.
    pub indexer_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            policy: ExpirationPolicy::default(),
            source_timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
            cache_seconds: DEFAULT_CACHE_SECONDS,
            indexer_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or(&lookup, "CERT_EXPIRY_PORT", defaults.port)?;
        let database_url =
            lookup("CERT_EXPIRY_DATABASE_URL").unwrap_or(defaults.database_url);

        let threshold_days: u32 =
            parse_or(&lookup, "CERT_EXPIRY_THRESHOLD_DAYS", DEFAULT_THRESHOLD_DAYS)?;
        if threshold_days == 0 {
            bail!("CERT_EXPIRY_THRESHOLD_DAYS must be greater than zero");
        }
        let inclusive = parse_or(
            &lookup,
            "CERT_EXPIRY_THRESHOLD_INCLUSIVE",
            defaults.policy.inclusive,
        )?;

        let timeout_secs = parse_or(
            &lookup,
            "CERT_EXPIRY_SOURCE_TIMEOUT_SECS",
            DEFAULT_SOURCE_TIMEOUT_SECS,
        )?;
        let cache_seconds = parse_or(&lookup, "CERT_EXPIRY_CACHE_SECONDS", defaults.cache_seconds)?;

        let indexer_url = lookup("CERT_EXPIRY_INDEXER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            port,
            database_url,
            policy: ExpirationPolicy {
                threshold_days,
                inclusive,
            },
            source_timeout: Duration::from_secs(timeout_secs),
            cache_seconds,
            indexer_url,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
