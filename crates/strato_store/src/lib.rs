pub mod config;
mod db;
mod family;
pub mod gc;
pub mod migration;
mod notify;
pub mod orchestrator;
mod proof;
mod repo;
pub mod store;
pub mod txn;

pub use config::{DatabaseConfig, GcConfig, LimitsConfig, PoolConfig, RetryConfig, StoreConfig};
pub use gc::{GarbageCollector, GcReport};
pub use orchestrator::Orchestrator;
pub use store::{StoreSettings, StratoStore};
pub use strato_core::*;
pub use txn::{RetryPolicy, TxnFuture, with_retrying_transaction};
