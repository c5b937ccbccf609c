use std::time::Duration;
use thiserror::Error;

use super::types::TransactionId;

/// Errors surfaced by the driver.
///
/// Classification into retriable / non-retriable and "session still alive"
/// happens once, in `classify`, at the boundary between the transport and
/// the retry loop. Every other layer re-raises these values unchanged.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The driver (or its session pool) has been closed.
    #[error("driver has been closed")]
    DriverClosed,

    /// No pool permit became available within the acquisition timeout.
    #[error("session pool empty: no session available within {0:?}")]
    PoolTimeout(Duration),

    /// The server rejected a commit because of a conflicting write.
    #[error("optimistic concurrency conflict: {0}")]
    OccConflict(String),

    /// The server no longer recognizes the session token.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// The ledger is over its concurrent-transaction capacity.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The server rejected the request as malformed (HTTP 4xx class).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A transport-level failure (HTTP 5xx, connection reset, timeout).
    #[error("transport failure{}: {message}", status.map(|s| format!(" (http {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The digest echoed by the server on commit differs from the digest
    /// accumulated locally. The transaction transcript cannot be trusted.
    #[error("commit digest mismatch for transaction {transaction_id}")]
    DigestMismatch { transaction_id: TransactionId },

    /// The transaction was explicitly aborted from inside the user closure.
    #[error("transaction {0} was aborted")]
    TransactionAborted(TransactionId),

    /// A commit was interrupted in flight; the server may or may not have
    /// applied it.
    #[error("commit of transaction {0} was interrupted; outcome unknown")]
    CommitUnknown(TransactionId),

    /// A result stream was enumerated more than once.
    #[error("result stream already consumed")]
    ResultConsumed,

    /// An operation was attempted in a state that forbids it.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// What the retry loop is allowed to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    pub retriable: bool,
    pub session_alive: bool,
}

impl Disposition {
    const fn new(retriable: bool, session_alive: bool) -> Self {
        Self {
            retriable,
            session_alive,
        }
    }
}

/// Classify an error for the retry loop.
///
/// Precedence follows the protocol contract: user abort, then the fatal
/// "transaction has expired" flavor of InvalidSession, then the retriable
/// classes (InvalidSession, OccConflict, CapacityExceeded, transport 5xx),
/// then everything else non-retriable.
pub(crate) fn classify(error: &DriverError) -> Disposition {
    match error {
        DriverError::TransactionAborted(_) => Disposition::new(false, true),
        DriverError::InvalidSession(msg) if is_transaction_expired(msg) => {
            Disposition::new(false, false)
        }
        DriverError::InvalidSession(_) => Disposition::new(true, false),
        DriverError::OccConflict(_) => Disposition::new(true, true),
        DriverError::CapacityExceeded(_) => Disposition::new(true, true),
        DriverError::Transport {
            status: Some(status),
            ..
        } if *status >= 500 => Disposition::new(true, false),
        DriverError::Transport { .. } => Disposition::new(false, false),
        DriverError::DigestMismatch { .. } => Disposition::new(false, true),
        DriverError::CommitUnknown(_) => Disposition::new(false, false),
        // Programming and lifecycle errors: never retried. The session was
        // not involved, so it stays usable.
        DriverError::DriverClosed
        | DriverError::PoolTimeout(_)
        | DriverError::BadRequest(_)
        | DriverError::ResultConsumed
        | DriverError::IllegalState(_) => Disposition::new(false, true),
    }
}

/// The server reports an expired transaction through InvalidSession with a
/// message of the form "Transaction <id> has expired".
fn is_transaction_expired(message: &str) -> bool {
    message.starts_with("Transaction") && message.contains("has expired")
}
