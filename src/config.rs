//! Process configuration read from the environment (and `.env`).

use crate::facade::DEFAULT_BASE_PATH;
use crate::storage::DurabilityMode;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RETENTION_TICK_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// In-memory store when unset.
    pub data_dir: Option<PathBuf>,
    pub durability: DurabilityMode,
    pub base_path: String,
    pub service_name: Option<String>,
    /// `None` leaves pruning piggybacked on traffic only.
    pub retention_tick: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("APP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let data_dir = lookup("REQLENS_DATA_DIR")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        let durability = lookup("REQLENS_DURABILITY")
            .unwrap_or_else(|| "async".to_string())
            .parse::<DurabilityMode>()
            .map_err(|err| anyhow!(err))
            .context("REQLENS_DURABILITY must be one of: sync, async, none")?;

        let base_path = lookup("REQLENS_BASE_PATH").unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());

        let service_name = lookup("REQLENS_SERVICE_NAME")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        let tick_secs = lookup("REQLENS_RETENTION_TICK_SECS")
            .unwrap_or_else(|| DEFAULT_RETENTION_TICK_SECS.to_string())
            .parse::<u64>()
            .context("REQLENS_RETENTION_TICK_SECS must be a valid u64")?;
        let retention_tick = (tick_secs > 0).then(|| Duration::from_secs(tick_secs));

        Ok(Self {
            host,
            port,
            data_dir,
            durability,
            base_path,
            service_name,
            retention_tick,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
