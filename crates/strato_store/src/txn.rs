use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, IsolationLevel,
    TransactionTrait,
};
use tokio::time::{sleep, timeout};

use strato_core::{DssError, DssResult};

use crate::RetryConfig;

/// Boxed body of a transaction, borrowing the transaction for `'c`.
pub type TxnFuture<'c, T> = Pin<Box<dyn Future<Output = DssResult<T>> + Send + 'c>>;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on the whole call, retries and backoff included.
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: Option<&RetryConfig>) -> Self {
        let defaults = RetryConfig::with_defaults();
        let config = config.unwrap_or(&defaults);
        Self {
            max_attempts: config.max_attempts.unwrap_or(10).max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms.unwrap_or(10)),
            max_backoff: Duration::from_millis(config.max_backoff_ms.unwrap_or(500)),
            deadline: Duration::from_millis(config.request_timeout_ms.unwrap_or(10_000)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(None)
    }
}

/// Runs `body` in a serializable transaction, re-running it from the start
/// when the store reports contention. Gives up after `max_attempts` or when
/// the deadline passes; an abandoned transaction is rolled back.
pub async fn with_retrying_transaction<T, F>(
    conn: &DatabaseConnection,
    policy: &RetryPolicy,
    body: F,
) -> DssResult<T>
where
    T: Send,
    F: for<'c> Fn(&'c DatabaseTransaction) -> TxnFuture<'c, T> + Send + Sync,
{
    let attempts = async {
        let mut backoff = policy.initial_backoff;
        let mut attempt = 1;
        loop {
            match run_once(conn, &body).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    log::warn!(
                        "transaction attempt {attempt}/{} hit contention, retrying: {err}",
                        policy.max_attempts
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(policy.max_backoff);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    };
    match timeout(policy.deadline, attempts).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "transaction abandoned after {} ms deadline",
                policy.deadline.as_millis()
            );
            Err(DssError::deadline_exceeded(format!(
                "operation did not complete within {} ms",
                policy.deadline.as_millis()
            )))
        }
    }
}

async fn run_once<T, F>(conn: &DatabaseConnection, body: &F) -> DssResult<T>
where
    F: for<'c> Fn(&'c DatabaseTransaction) -> TxnFuture<'c, T>,
{
    let txn = begin(conn).await?;
    match body(&txn).await {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = txn.rollback().await {
                log::warn!("rollback failed: {rollback}");
            }
            Err(err)
        }
    }
}

async fn begin(conn: &DatabaseConnection) -> DssResult<DatabaseTransaction> {
    let txn = match conn.get_database_backend() {
        // SQLite transactions are already serializable.
        DatabaseBackend::Sqlite => conn.begin().await?,
        _ => {
            conn.begin_with_config(Some(IsolationLevel::Serializable), None)
                .await?
        }
    };
    Ok(txn)
}
