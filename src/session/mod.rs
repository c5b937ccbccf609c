pub mod config;
pub mod pool;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::core::types::{Document, Page, PageToken, SessionId, SessionToken, TransactionId};
use crate::core::{DriverError, IoUsage, Result, TimingInformation};
use crate::transport::{Command, LedgerTransport, Response};

/// Output of one execute-statement command: the first page plus the
/// server statistics reported alongside it.
#[derive(Debug)]
pub struct StatementOutput {
    pub first_page: Page,
    pub consumed_ios: Option<IoUsage>,
    pub timing_information: Option<TimingInformation>,
}

/// Output of one fetch-page command.
#[derive(Debug)]
pub struct PageOutput {
    pub page: Page,
    pub consumed_ios: Option<IoUsage>,
    pub timing_information: Option<TimingInformation>,
}

/// One-to-one handle to a server-side session.
///
/// Translates each driver operation into exactly one protocol command. The
/// session imposes no concurrency control of its own; callers must not
/// issue overlapping commands.
pub struct Session {
    token: SessionToken,
    id: SessionId,
    transport: Arc<dyn LedgerTransport>,
}

impl Session {
    /// Open a server session on the given ledger.
    ///
    /// The request-id of the start-session response becomes the
    /// client-visible session id, distinct from the secret wire token.
    pub(crate) async fn open(
        transport: Arc<dyn LedgerTransport>,
        ledger_name: &str,
    ) -> Result<Self> {
        let reply = transport
            .send(Command::StartSession {
                ledger_name: ledger_name.to_string(),
            })
            .await?;
        let token = match reply.response {
            Response::StartSession { session_token } => session_token,
            other => return Err(unexpected_reply("StartSession", &other)),
        };
        let id = SessionId::new(reply.request_id);
        debug!(session_id = %id, "session opened");
        Ok(Self {
            token,
            id,
            transport,
        })
    }

    /// Client-visible session identity.
    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    pub(crate) async fn start_transaction(&self) -> Result<TransactionId> {
        let reply = self
            .transport
            .send(Command::StartTransaction {
                session_token: self.token.clone(),
            })
            .await?;
        match reply.response {
            Response::StartTransaction { transaction_id } => Ok(transaction_id),
            other => Err(unexpected_reply("StartTransaction", &other)),
        }
    }

    pub(crate) async fn execute_statement(
        &self,
        transaction_id: &TransactionId,
        statement: &str,
        parameters: Vec<Document>,
    ) -> Result<StatementOutput> {
        let reply = self
            .transport
            .send(Command::ExecuteStatement {
                session_token: self.token.clone(),
                transaction_id: transaction_id.clone(),
                statement: statement.to_string(),
                parameters,
            })
            .await?;
        match reply.response {
            Response::ExecuteStatement {
                first_page,
                consumed_ios,
                timing_information,
            } => Ok(StatementOutput {
                first_page,
                consumed_ios,
                timing_information,
            }),
            other => Err(unexpected_reply("ExecuteStatement", &other)),
        }
    }

    pub(crate) async fn fetch_page(
        &self,
        transaction_id: &TransactionId,
        page_token: PageToken,
    ) -> Result<PageOutput> {
        let reply = self
            .transport
            .send(Command::FetchPage {
                session_token: self.token.clone(),
                transaction_id: transaction_id.clone(),
                page_token,
            })
            .await?;
        match reply.response {
            Response::FetchPage {
                page,
                consumed_ios,
                timing_information,
            } => Ok(PageOutput {
                page,
                consumed_ios,
                timing_information,
            }),
            other => Err(unexpected_reply("FetchPage", &other)),
        }
    }

    /// Send the commit command and return the digest echoed by the server.
    /// The caller is responsible for verifying the echo against its own
    /// accumulated digest.
    pub(crate) async fn commit_transaction(
        &self,
        transaction_id: &TransactionId,
        commit_digest: Bytes,
    ) -> Result<Bytes> {
        let reply = self
            .transport
            .send(Command::CommitTransaction {
                session_token: self.token.clone(),
                transaction_id: transaction_id.clone(),
                commit_digest,
            })
            .await?;
        match reply.response {
            Response::CommitTransaction { commit_digest, .. } => Ok(commit_digest),
            other => Err(unexpected_reply("CommitTransaction", &other)),
        }
    }

    pub(crate) async fn abort_transaction(&self) -> Result<()> {
        let reply = self
            .transport
            .send(Command::AbortTransaction {
                session_token: self.token.clone(),
            })
            .await?;
        match reply.response {
            Response::AbortTransaction => Ok(()),
            other => Err(unexpected_reply("AbortTransaction", &other)),
        }
    }

    /// Close the server session. Best-effort callers ignore the result.
    pub(crate) async fn end(&self) -> Result<()> {
        let reply = self
            .transport
            .send(Command::EndSession {
                session_token: self.token.clone(),
            })
            .await?;
        match reply.response {
            Response::EndSession => {
                debug!(session_id = %self.id, "session ended");
                Ok(())
            }
            other => Err(unexpected_reply("EndSession", &other)),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

fn unexpected_reply(expected: &str, got: &Response) -> DriverError {
    DriverError::IllegalState(format!(
        "protocol violation: expected {expected} reply, got {got:?}"
    ))
}

/// Opens sessions for the pool.
///
/// Modeled as a trait so the pool can be exercised without a transport.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Session>;
}

/// Default factory: opens sessions on one ledger through the transport.
pub struct TransportSessionFactory {
    transport: Arc<dyn LedgerTransport>,
    ledger_name: String,
}

impl TransportSessionFactory {
    pub fn new(transport: Arc<dyn LedgerTransport>, ledger_name: impl Into<String>) -> Self {
        Self {
            transport,
            ledger_name: ledger_name.into(),
        }
    }
}

#[async_trait]
impl SessionFactory for TransportSessionFactory {
    async fn open_session(&self) -> Result<Session> {
        Session::open(self.transport.clone(), &self.ledger_name).await
    }
}
