use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use strato_core::{DssError, DssResult};

const DEFAULT_CONFIG_NAME: &str = "strato.json";
const DEFAULT_SQLITE_NAME: &str = "strato.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_area_km2: Option<f64>,
    pub max_clock_skew_ms: Option<u64>,
    pub max_subscriptions_per_area: Option<u32>,
    pub max_subscription_duration_ms: Option<u64>,
    pub cell_level: Option<u8>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_area_km2: Some(2_500.0),
            max_clock_skew_ms: Some(300_000),
            max_subscriptions_per_area: Some(10),
            max_subscription_duration_ms: Some(86_400_000),
            cell_level: Some(13),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl RetryConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_attempts: Some(10),
            initial_backoff_ms: Some(10),
            max_backoff_ms: Some(500),
            request_timeout_ms: Some(10_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    pub batch_limit: Option<u64>,
    pub tombstone_retention_ms: Option<u64>,
}

impl GcConfig {
    pub fn with_defaults() -> Self {
        Self {
            batch_limit: Some(1_000),
            tombstone_retention_ms: Some(86_400_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub retry: Option<RetryConfig>,
    pub gc: Option<GcConfig>,
    /// Identity of this service instance. Rows are stamped with it and the
    /// collector only removes rows carrying it.
    pub writer: Option<String>,
}

impl StoreConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            retry: Some(RetryConfig::with_defaults()),
            gc: Some(GcConfig::with_defaults()),
            writer: None,
        }
    }

    /// Reads `strato.json` under `base_dir`, first writing a sqlite config
    /// with a database file alongside it if there is none.
    pub fn load_or_init(base_dir: &Path) -> DssResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| DssError::internal(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| DssError::internal(format!("read config: {err}")))?;
            let config: StoreConfig = serde_json::from_str(&raw)
                .map_err(|err| DssError::bad_request(format!("invalid config: {err}")))?;
            return Ok(config);
        }
        let default = StoreConfig::default_sqlite(DEFAULT_SQLITE_NAME);
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| DssError::internal(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| DssError::internal(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> DssResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_SQLITE_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(DssError::bad_request("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }
}
