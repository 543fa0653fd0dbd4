use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;

use crate::gc::GarbageCollector;
use crate::migration::Migrator;
use crate::orchestrator::Orchestrator;
use crate::txn::RetryPolicy;
use crate::{DatabaseConfig, GcConfig, LimitsConfig, StoreConfig};
use strato_core::cell::DEFAULT_LEVEL;
use strato_core::{Clock, Coverer, DssError, DssResult, TimePolicy};

const DEFAULT_WRITER: &str = "strato";

/// Resolved limits and policies, with every default applied.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub cell_level: u8,
    pub max_area_km2: f64,
    pub max_clock_skew: Duration,
    pub max_subscriptions_per_area: u32,
    pub max_subscription_duration: Duration,
    pub retry: RetryPolicy,
    pub gc_batch_limit: u64,
    pub tombstone_retention: Duration,
    pub writer: String,
}

impl StoreSettings {
    pub fn from_config(config: &StoreConfig) -> Self {
        let limits = config.limits.clone().unwrap_or_else(LimitsConfig::with_defaults);
        let gc = config.gc.clone().unwrap_or_else(GcConfig::with_defaults);
        Self {
            cell_level: limits.cell_level.unwrap_or(DEFAULT_LEVEL),
            max_area_km2: limits.max_area_km2.unwrap_or(2_500.0),
            max_clock_skew: Duration::from_millis(limits.max_clock_skew_ms.unwrap_or(300_000)),
            max_subscriptions_per_area: limits.max_subscriptions_per_area.unwrap_or(10),
            max_subscription_duration: Duration::from_millis(
                limits.max_subscription_duration_ms.unwrap_or(86_400_000),
            ),
            retry: RetryPolicy::from_config(config.retry.as_ref()),
            gc_batch_limit: gc.batch_limit.unwrap_or(1_000),
            tombstone_retention: Duration::from_millis(
                gc.tombstone_retention_ms.unwrap_or(86_400_000),
            ),
            writer: config
                .writer
                .clone()
                .unwrap_or_else(|| DEFAULT_WRITER.to_string()),
        }
    }

    pub fn coverer(&self) -> Coverer {
        Coverer::new(self.cell_level, self.max_area_km2)
    }

    /// Operational intents, constraints and service areas.
    pub fn entity_time_policy(&self) -> TimePolicy {
        TimePolicy {
            max_clock_skew: self.max_clock_skew,
            default_duration: None,
            max_duration: None,
        }
    }

    pub fn subscription_time_policy(&self) -> TimePolicy {
        TimePolicy {
            max_clock_skew: self.max_clock_skew,
            default_duration: Some(self.max_subscription_duration),
            max_duration: Some(self.max_subscription_duration),
        }
    }
}

/// Connection to a migrated datastore. Mutations go through the
/// [`Orchestrator`] it hands out; the store itself exposes no write path.
#[derive(Clone)]
pub struct StratoStore {
    conn: DatabaseConnection,
    settings: Arc<StoreSettings>,
}

impl StratoStore {
    pub async fn connect(config: &StoreConfig, base_dir: &Path) -> DssResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        options.sqlx_logging(false);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await?;
        let store = Self {
            conn,
            settings: Arc::new(StoreSettings::from_config(config)),
        };
        store.migrate().await?;
        log::info!(
            "strato store ready: backend={} writer={}",
            config.backend_name(),
            store.settings.writer
        );
        Ok(store)
    }

    /// Opens the datastore rooted at `base_dir`, initialising its config on
    /// first use.
    pub async fn open_dir(base_dir: &Path) -> DssResult<Self> {
        let config = StoreConfig::load_or_init(base_dir)?;
        Self::connect(&config, base_dir).await
    }

    pub async fn connect_sqlite(path: &Path) -> DssResult<Self> {
        let config = StoreConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub async fn migrate(&self) -> DssResult<()> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }

    /// Runs a trivial query against the backend.
    pub async fn health_check(&self) -> DssResult<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?
            .map(|_| ())
            .ok_or_else(|| DssError::internal("health check returned no rows"))
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn orchestrator(&self, clock: Arc<dyn Clock>) -> Orchestrator {
        Orchestrator::new(self.clone(), clock)
    }

    pub fn garbage_collector(&self, clock: Arc<dyn Clock>) -> GarbageCollector {
        GarbageCollector::new(self.clone(), clock)
    }

    pub(crate) fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

fn build_connection_url(config: &StoreConfig, base_dir: &Path) -> DssResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}
