// ============================================================================
// Transaction State Machine
// ============================================================================
//
// One server-side transaction: Open until committed, aborted, or failed.
// Aggregates the commit digest as statements execute and verifies the
// server's digest echo at commit time.
//
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::types::{Document, TransactionId};
use crate::core::{DriverError, Result};
use crate::digest::CommitDigest;
use crate::result::StatementResult;
use crate::session::Session;

/// Lifecycle of one transaction.
///
/// ```text
/// Open ──commit──> Committed
///   │──abort───> Aborted
///   └──error───> Errored ──abort──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting statements.
    Open,

    /// Commit acknowledged; the digest echo matched.
    Committed,

    /// Abort sent (or attempted).
    Aborted,

    /// A statement or commit failed; only abort is still legal.
    Errored,
}

impl TransactionState {
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionState::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Open => write!(f, "OPEN"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
            TransactionState::Errored => write!(f, "ERRORED"),
        }
    }
}

/// One server-side transaction bound to one session.
///
/// Owned by the retry loop for its whole life; user closures interact with
/// it through [`TransactionView`], which cannot commit.
pub struct Transaction {
    session: Arc<Session>,
    id: TransactionId,
    digest: Mutex<CommitDigest>,
    state: Mutex<TransactionState>,
    session_alive: AtomicBool,
}

impl Transaction {
    /// Start a transaction on the session and seed the commit digest from
    /// the server-issued transaction id.
    pub(crate) async fn start(session: Arc<Session>) -> Result<Self> {
        let id = session.start_transaction().await?;
        debug!(transaction_id = %id, "transaction started");
        Ok(Self {
            digest: Mutex::new(CommitDigest::seed(&id)),
            id,
            session,
            state: Mutex::new(TransactionState::Open),
            session_alive: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Whether the session is believed usable after the last operation.
    /// Flips to false when an abort send fails.
    pub(crate) fn session_alive(&self) -> bool {
        self.session_alive.load(Ordering::SeqCst)
    }

    /// Current digest snapshot.
    pub fn commit_digest(&self) -> CommitDigest {
        *self.digest.lock()
    }

    /// Execute one statement. Valid only while the transaction is open.
    ///
    /// The digest is folded after the server acknowledges the statement,
    /// so it reflects statements in server-acknowledged order.
    pub async fn execute(
        &self,
        statement: &str,
        parameters: Vec<Document>,
    ) -> Result<StatementResult> {
        self.ensure_open("execute")?;

        let output = match self
            .session
            .execute_statement(&self.id, statement, parameters.clone())
            .await
        {
            Ok(output) => output,
            Err(error) => {
                self.set_state(TransactionState::Errored);
                return Err(error);
            }
        };

        self.digest.lock().update(statement, &parameters);

        Ok(StatementResult::new(
            self.session.clone(),
            self.id.clone(),
            output.first_page,
            output.consumed_ios,
            output.timing_information,
        ))
    }

    /// Commit with the accumulated digest and verify the server's echo.
    pub(crate) async fn commit(&self) -> Result<()> {
        self.ensure_open("commit")?;

        let digest = self.commit_digest();
        let echoed = match self
            .session
            .commit_transaction(&self.id, Bytes::copy_from_slice(digest.as_bytes()))
            .await
        {
            Ok(echoed) => echoed,
            Err(error) => {
                self.set_state(TransactionState::Errored);
                // A commit round trip that broke without a server verdict
                // is indeterminate: the server may or may not have
                // applied it.
                if let DriverError::Transport { status: None, .. } = &error {
                    return Err(DriverError::CommitUnknown(self.id.clone()));
                }
                return Err(error);
            }
        };

        if echoed.as_ref() != digest.as_bytes() {
            self.set_state(TransactionState::Errored);
            return Err(DriverError::DigestMismatch {
                transaction_id: self.id.clone(),
            });
        }

        self.set_state(TransactionState::Committed);
        debug!(transaction_id = %self.id, "transaction committed");
        Ok(())
    }

    /// Send an abort. Valid in Open or Errored; a no-op in terminal
    /// states. Send failures are swallowed but mark the session dead.
    pub(crate) async fn abort(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.set_state(TransactionState::Aborted);
        if let Err(error) = self.session.abort_transaction().await {
            debug!(transaction_id = %self.id, %error, "abort failed; marking session dead");
            self.session_alive.store(false, Ordering::SeqCst);
        }
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            return Err(DriverError::IllegalState(format!(
                "cannot {operation}: transaction {} is {state}",
                self.id
            )));
        }
        Ok(())
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Restricted transaction handle passed to user closures.
///
/// Permits `execute` and `abort`; committing is reserved to the driver,
/// which commits automatically when the closure returns.
#[derive(Clone)]
pub struct TransactionView {
    inner: Arc<Transaction>,
}

impl TransactionView {
    pub(crate) fn new(inner: Arc<Transaction>) -> Self {
        Self { inner }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        self.inner.id()
    }

    /// Execute one PartiQL statement inside the transaction.
    pub async fn execute(
        &self,
        statement: &str,
        parameters: Vec<Document>,
    ) -> Result<StatementResult> {
        self.inner.execute(statement, parameters).await
    }

    /// Abort the transaction. The driver surfaces the abort to the
    /// `execute` caller as a terminal error; no retry follows.
    pub async fn abort(&self) {
        self.inner.abort().await;
    }
}

impl std::fmt::Debug for TransactionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionView")
            .field("id", self.inner.id())
            .finish()
    }
}
