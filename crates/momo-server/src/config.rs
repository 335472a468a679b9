use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use momo_gateway::SessionConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("MOMO_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MOMO_JWT_SECRET is unset or still a placeholder");
        }

        let host = lookup("MOMO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "MOMO_PORT", 8080u16)?;
        let db_path = lookup("MOMO_DB_PATH").unwrap_or_else(|| "momo.db".into()).into();

        let outbound_capacity = parse_or(&lookup, "MOMO_OUTBOUND_QUEUE", 256usize)?;
        if outbound_capacity == 0 {
            bail!("MOMO_OUTBOUND_QUEUE must be at least 1");
        }
        let heartbeat_secs = parse_or(&lookup, "MOMO_HEARTBEAT_SECS", 15u64)?;
        if heartbeat_secs == 0 {
            bail!("MOMO_HEARTBEAT_SECS must be at least 1");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            session: SessionConfig {
                outbound_capacity,
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
