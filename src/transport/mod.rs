pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::core::types::{Document, Page, PageToken, SessionToken, TransactionId};
use crate::core::{DriverError, IoUsage, TimingInformation};

/// One protocol command sent to the ledger service.
#[derive(Debug, Clone)]
pub enum Command {
    StartSession {
        ledger_name: String,
    },
    StartTransaction {
        session_token: SessionToken,
    },
    ExecuteStatement {
        session_token: SessionToken,
        transaction_id: TransactionId,
        statement: String,
        parameters: Vec<Document>,
    },
    FetchPage {
        session_token: SessionToken,
        transaction_id: TransactionId,
        page_token: PageToken,
    },
    CommitTransaction {
        session_token: SessionToken,
        transaction_id: TransactionId,
        commit_digest: Bytes,
    },
    AbortTransaction {
        session_token: SessionToken,
    },
    EndSession {
        session_token: SessionToken,
    },
}

impl Command {
    /// Discriminant used for logging and mock script matching.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StartSession { .. } => CommandKind::StartSession,
            Command::StartTransaction { .. } => CommandKind::StartTransaction,
            Command::ExecuteStatement { .. } => CommandKind::ExecuteStatement,
            Command::FetchPage { .. } => CommandKind::FetchPage,
            Command::CommitTransaction { .. } => CommandKind::CommitTransaction,
            Command::AbortTransaction { .. } => CommandKind::AbortTransaction,
            Command::EndSession { .. } => CommandKind::EndSession,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartSession,
    StartTransaction,
    ExecuteStatement,
    FetchPage,
    CommitTransaction,
    AbortTransaction,
    EndSession,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::StartSession => "StartSession",
            CommandKind::StartTransaction => "StartTransaction",
            CommandKind::ExecuteStatement => "ExecuteStatement",
            CommandKind::FetchPage => "FetchPage",
            CommandKind::CommitTransaction => "CommitTransaction",
            CommandKind::AbortTransaction => "AbortTransaction",
            CommandKind::EndSession => "EndSession",
        };
        f.write_str(name)
    }
}

/// Payload of a successful command.
#[derive(Debug, Clone)]
pub enum Response {
    StartSession {
        session_token: SessionToken,
    },
    StartTransaction {
        transaction_id: TransactionId,
    },
    ExecuteStatement {
        first_page: Page,
        consumed_ios: Option<IoUsage>,
        timing_information: Option<TimingInformation>,
    },
    FetchPage {
        page: Page,
        consumed_ios: Option<IoUsage>,
        timing_information: Option<TimingInformation>,
    },
    CommitTransaction {
        transaction_id: TransactionId,
        commit_digest: Bytes,
    },
    AbortTransaction,
    EndSession,
}

/// A successful transport round trip.
///
/// Every reply carries the request-id the server stamped on the response;
/// the start-session request-id becomes the client-visible session id.
#[derive(Debug, Clone)]
pub struct Reply {
    pub request_id: String,
    pub response: Response,
}

/// Errors raised by the transport, before driver classification.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("occ conflict: {0}")]
    OccConflict(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<TransportError> for DriverError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::OccConflict(msg) => DriverError::OccConflict(msg),
            TransportError::InvalidSession(msg) => DriverError::InvalidSession(msg),
            TransportError::CapacityExceeded(msg) => DriverError::CapacityExceeded(msg),
            TransportError::BadRequest(msg) => DriverError::BadRequest(msg),
            TransportError::Http { status, message } => DriverError::Transport {
                status: Some(status),
                message,
            },
            TransportError::Io(message) => DriverError::Transport {
                status: None,
                message,
            },
        }
    }
}

/// Opaque request/response channel to the ledger service.
///
/// Implementations own endpoint resolution, signing, and serialization.
/// The driver issues at most one in-flight command per session through
/// this interface.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    async fn send(&self, command: Command) -> Result<Reply, TransportError>;
}
