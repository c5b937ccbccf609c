// ============================================================================
// Ledger Driver Library
// ============================================================================

pub mod blocking;
pub mod core;
pub mod digest;
mod executor;
pub mod result;
pub mod retry;
pub mod session;
pub mod transaction;
pub mod transport;

use std::future::Future;
use std::sync::Arc;

// Re-export main types for convenience
pub use crate::core::{
    Document, DriverError, IoUsage, Result, SessionId, TimingInformation, TransactionId,
};
pub use crate::digest::CommitDigest;
pub use crate::result::{BufferedResult, ResultStream, StatementResult};
pub use crate::retry::{
    BackoffStrategy, ConstantBackoff, ExponentialBackoff, RetryContext, RetryPolicy,
};
pub use crate::session::config::DriverConfig;
pub use crate::session::pool::SessionPool;
pub use crate::session::{SessionFactory, TransportSessionFactory};
pub use crate::transaction::TransactionView;
pub use crate::transport::{
    Command, CommandKind, LedgerTransport, Reply, Response, TransportError,
};

/// Statement used by [`LedgerDriver::list_table_names`].
pub const ACTIVE_TABLES_STATEMENT: &str =
    "SELECT VALUE name FROM information_schema.user_tables WHERE status = 'ACTIVE'";

// ============================================================================
// High-level Driver API
// ============================================================================

/// Transactional client for one ledger.
///
/// Wraps a bounded session pool and a retry loop: `execute` runs a user
/// closure inside an ACID transaction, commits it with the accumulated
/// digest when the closure returns, and transparently replays the closure
/// on retriable failures (OCC conflicts, expired pooled sessions,
/// transient server errors). The closure must therefore be idempotent from
/// the application's point of view.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use ledger_driver::transport::mock::MockTransport;
/// use ledger_driver::transport::{CommandKind, Response};
/// use ledger_driver::core::types::{Page, SessionToken, TransactionId};
/// use ledger_driver::{CommitDigest, DriverConfig, LedgerDriver};
///
/// # tokio_test::block_on(async {
/// let transport = Arc::new(MockTransport::new());
/// transport.expect_ok(CommandKind::StartSession, Response::StartSession {
///     session_token: SessionToken::new("token"),
/// });
/// transport.expect_ok(CommandKind::StartTransaction, Response::StartTransaction {
///     transaction_id: TransactionId::from("txn-1"),
/// });
/// transport.expect_ok(CommandKind::ExecuteStatement, Response::ExecuteStatement {
///     first_page: Page::default(),
///     consumed_ios: None,
///     timing_information: None,
/// });
/// let mut digest = CommitDigest::seed(&TransactionId::from("txn-1"));
/// digest.update("DELETE FROM vehicles WHERE vin = ?", &["KM8".into()]);
/// transport.expect_ok(CommandKind::CommitTransaction, Response::CommitTransaction {
///     transaction_id: TransactionId::from("txn-1"),
///     commit_digest: Bytes::copy_from_slice(digest.as_bytes()),
/// });
///
/// let driver = LedgerDriver::new(DriverConfig::new("vehicle-registration"), transport)?;
/// driver
///     .execute(|txn| async move {
///         txn.execute("DELETE FROM vehicles WHERE vin = ?", vec!["KM8".into()])
///             .await?;
///         Ok(())
///     })
///     .await?;
/// driver.close().await;
/// # Ok::<(), ledger_driver::DriverError>(())
/// # }).unwrap();
/// ```
pub struct LedgerDriver {
    pool: SessionPool,
    policy: RetryPolicy,
}

impl LedgerDriver {
    /// Create a driver over the given transport.
    pub fn new(config: DriverConfig, transport: Arc<dyn LedgerTransport>) -> Result<Self> {
        let factory = Arc::new(TransportSessionFactory::new(
            transport,
            config.ledger_name.clone(),
        ));
        Self::with_session_factory(config, factory)
    }

    /// Create a driver with a custom session factory. Mainly useful for
    /// exercising the pool and retry loop without a transport.
    pub fn with_session_factory(
        config: DriverConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self> {
        config.validate().map_err(DriverError::BadRequest)?;
        let pool = SessionPool::new(factory, config.pool_capacity(), config.acquire_timeout);
        Ok(Self {
            pool,
            policy: config.retry_policy,
        })
    }

    /// Run `f` inside a transaction with the driver's default retry
    /// policy.
    ///
    /// The closure receives a [`TransactionView`] that can execute
    /// statements and abort, but not commit: the driver commits when the
    /// closure returns `Ok`. On a retriable failure the whole closure is
    /// replayed, possibly on a different session.
    pub async fn execute<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: Fn(TransactionView) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        executor::execute_with_retry(&self.pool, &self.policy, &f).await
    }

    /// Run `f` inside a transaction with a caller-supplied retry policy.
    pub async fn execute_with_policy<F, Fut, R>(&self, f: F, policy: &RetryPolicy) -> Result<R>
    where
        F: Fn(TransactionView) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        executor::execute_with_retry(&self.pool, policy, &f).await
    }

    /// Names of active tables in the ledger, in server-defined order.
    pub async fn list_table_names(&self) -> Result<Vec<String>> {
        let buffered = self
            .execute(|txn| async move {
                let mut result = txn.execute(ACTIVE_TABLES_STATEMENT, Vec::new()).await?;
                result.buffer().await
            })
            .await?;

        buffered
            .iter()
            .map(|doc| {
                doc.as_str().map(str::to_string).ok_or_else(|| {
                    DriverError::IllegalState("table name is not valid utf-8 text".into())
                })
            })
            .collect()
    }

    /// Close the driver and its session pool. Idempotent; in-flight
    /// transactions finish, but new `execute` calls fail with
    /// [`DriverError::DriverClosed`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// The underlying session pool, exposed for observability and tests.
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }
}

impl std::fmt::Debug for LedgerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDriver")
            .field("capacity", &self.pool.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
