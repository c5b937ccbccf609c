//! Synchronous facade over the async driver.
//!
//! Owns a private tokio runtime and reuses the async session pool, retry
//! loop, and digest logic unchanged. User closures run on a blocking
//! worker thread; each session command they issue is bridged onto the
//! runtime individually, so the retry loop is shared rather than
//! duplicated per concurrency mode.

use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task;

use crate::core::types::{Document, TransactionId};
use crate::core::{DriverError, Result};
use crate::result::{BufferedResult, ResultStream, StatementResult};
use crate::retry::RetryPolicy;
use crate::session::config::DriverConfig;
use crate::transaction::TransactionView;
use crate::transport::LedgerTransport;

/// Blocking counterpart of [`crate::LedgerDriver`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ledger_driver::blocking::LedgerDriver;
/// use ledger_driver::DriverConfig;
/// # fn transport() -> Arc<dyn ledger_driver::LedgerTransport> { unimplemented!() }
///
/// # fn main() -> Result<(), ledger_driver::DriverError> {
/// let driver = LedgerDriver::new(DriverConfig::new("vehicle-registration"), transport())?;
/// let names = driver.list_table_names()?;
/// for name in names {
///     println!("{name}");
/// }
/// driver.close();
/// # Ok(())
/// # }
/// ```
pub struct LedgerDriver {
    inner: Arc<crate::LedgerDriver>,
    runtime: Runtime,
}

impl LedgerDriver {
    pub fn new(config: DriverConfig, transport: Arc<dyn LedgerTransport>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| DriverError::IllegalState(format!("failed to start runtime: {e}")))?;
        let inner = Arc::new(crate::LedgerDriver::new(config, transport)?);
        Ok(Self { inner, runtime })
    }

    /// Run `f` inside a transaction with the driver's default retry
    /// policy.
    ///
    /// The closure runs on a blocking worker thread and may be replayed on
    /// retriable failures, exactly like the async `execute`.
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&mut Transaction) -> Result<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.execute_inner(f, None)
    }

    /// Run `f` with a caller-supplied retry policy.
    pub fn execute_with_policy<F, R>(&self, f: F, policy: &RetryPolicy) -> Result<R>
    where
        F: Fn(&mut Transaction) -> Result<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.execute_inner(f, Some(policy.clone()))
    }

    fn execute_inner<F, R>(&self, f: F, policy: Option<RetryPolicy>) -> Result<R>
    where
        F: Fn(&mut Transaction) -> Result<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let handle = self.runtime.handle().clone();
        let inner = self.inner.clone();

        let lambda = move |view: TransactionView| {
            let f = f.clone();
            let handle = handle.clone();
            async move {
                // Hop to a blocking thread so the closure can issue
                // commands with Handle::block_on without re-entering the
                // runtime.
                task::spawn_blocking(move || {
                    let mut txn = Transaction { view, handle };
                    f(&mut txn)
                })
                .await
                .map_err(|e| {
                    DriverError::IllegalState(format!("transaction closure panicked: {e}"))
                })?
            }
        };

        self.runtime.block_on(async move {
            match policy {
                Some(policy) => inner.execute_with_policy(lambda, &policy).await,
                None => inner.execute(lambda).await,
            }
        })
    }

    /// Names of active tables in the ledger, in server-defined order.
    pub fn list_table_names(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.list_table_names())
    }

    /// Close the driver and its session pool. Idempotent.
    pub fn close(&self) {
        self.runtime.block_on(self.inner.close());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl std::fmt::Debug for LedgerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("blocking::LedgerDriver")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Blocking view of an open transaction, handed to `execute` closures.
pub struct Transaction {
    view: TransactionView,
    handle: Handle,
}

impl Transaction {
    pub fn transaction_id(&self) -> &TransactionId {
        self.view.transaction_id()
    }

    /// Execute one PartiQL statement inside the transaction.
    pub fn execute(&mut self, statement: &str, parameters: Vec<Document>) -> Result<Statement> {
        let result = self
            .handle
            .block_on(self.view.execute(statement, parameters))?;
        Ok(Statement {
            inner: result,
            handle: self.handle.clone(),
        })
    }

    /// Abort the transaction; the driver surfaces the abort as a terminal
    /// error.
    pub fn abort(&mut self) {
        self.handle.block_on(self.view.abort());
    }
}

/// Blocking handle to one statement's output.
pub struct Statement {
    inner: StatementResult,
    handle: Handle,
}

impl Statement {
    /// Take the single-use stream over the statement output.
    pub fn stream(&mut self) -> Result<Stream> {
        Ok(Stream {
            inner: self.inner.stream()?,
            handle: self.handle.clone(),
        })
    }

    /// Drain the output into a re-enumerable buffer.
    pub fn buffer(&mut self) -> Result<BufferedResult> {
        let handle = self.handle.clone();
        handle.block_on(self.inner.buffer())
    }

    pub fn consumed_ios(&self) -> Option<crate::core::IoUsage> {
        self.inner.consumed_ios()
    }

    pub fn timing_information(&self) -> Option<crate::core::TimingInformation> {
        self.inner.timing_information()
    }
}

/// Blocking, single-use cursor over paginated statement output.
pub struct Stream {
    inner: ResultStream,
    handle: Handle,
}

impl Stream {
    pub fn next(&mut self) -> Result<Option<Document>> {
        let handle = self.handle.clone();
        handle.block_on(self.inner.next())
    }

    pub fn consumed_ios(&self) -> Option<crate::core::IoUsage> {
        self.inner.consumed_ios()
    }

    pub fn timing_information(&self) -> Option<crate::core::TimingInformation> {
        self.inner.timing_information()
    }
}
