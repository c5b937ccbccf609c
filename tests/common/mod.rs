//! Script-building helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use ledger_driver::core::types::{Page, PageToken, SessionToken, TransactionId};
use ledger_driver::transport::mock::MockTransport;
use ledger_driver::transport::{CommandKind, Response, TransportError};
use ledger_driver::{CommitDigest, Document, IoUsage, TimingInformation};

/// Fresh scripted transport, with the driver's tracing output routed to
/// the test writer so `cargo test -- --nocapture` shows retry and pool
/// events. `try_init` keeps repeated calls harmless.
pub fn mock_transport() -> Arc<MockTransport> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(MockTransport::new())
}

pub fn expect_start_session(transport: &MockTransport, token: &str) {
    transport.expect_ok(
        CommandKind::StartSession,
        Response::StartSession {
            session_token: SessionToken::new(token),
        },
    );
}

pub fn expect_start_transaction(transport: &MockTransport, transaction_id: &str) {
    transport.expect_ok(
        CommandKind::StartTransaction,
        Response::StartTransaction {
            transaction_id: TransactionId::from(transaction_id),
        },
    );
}

pub fn expect_start_transaction_err(transport: &MockTransport, error: TransportError) {
    transport.expect_err(CommandKind::StartTransaction, error);
}

pub fn expect_execute_values(transport: &MockTransport, values: &[&str], next: Option<&str>) {
    transport.expect_ok(
        CommandKind::ExecuteStatement,
        Response::ExecuteStatement {
            first_page: Page::new(
                values.iter().map(|v| Document::from(*v)).collect(),
                next.map(PageToken::new),
            ),
            consumed_ios: Some(IoUsage {
                read_ios: 1,
                write_ios: 0,
            }),
            timing_information: Some(TimingInformation {
                processing_time_ms: 1,
            }),
        },
    );
}

pub fn expect_execute_err(transport: &MockTransport, error: TransportError) {
    transport.expect_err(CommandKind::ExecuteStatement, error);
}

pub fn expect_fetch_page(transport: &MockTransport, values: &[&str], next: Option<&str>) {
    transport.expect_ok(
        CommandKind::FetchPage,
        Response::FetchPage {
            page: Page::new(
                values.iter().map(|v| Document::from(*v)).collect(),
                next.map(PageToken::new),
            ),
            consumed_ios: Some(IoUsage {
                read_ios: 1,
                write_ios: 0,
            }),
            timing_information: Some(TimingInformation {
                processing_time_ms: 1,
            }),
        },
    );
}

/// Expected digest for a transaction that executed the given statements
/// (each with its parameters) in order.
pub fn digest_after(transaction_id: &str, statements: &[(&str, &[Document])]) -> CommitDigest {
    let mut digest = CommitDigest::seed(&TransactionId::from(transaction_id));
    for (statement, parameters) in statements {
        digest.update(statement, parameters);
    }
    digest
}

/// Script a successful commit echoing the digest the driver will have
/// accumulated for `statements`.
pub fn expect_commit(
    transport: &MockTransport,
    transaction_id: &str,
    statements: &[(&str, &[Document])],
) {
    let digest = digest_after(transaction_id, statements);
    transport.expect_ok(
        CommandKind::CommitTransaction,
        Response::CommitTransaction {
            transaction_id: TransactionId::from(transaction_id),
            commit_digest: Bytes::copy_from_slice(digest.as_bytes()),
        },
    );
}

pub fn expect_abort(transport: &MockTransport) {
    transport.expect_ok(CommandKind::AbortTransaction, Response::AbortTransaction);
}

pub fn expect_end_session(transport: &MockTransport) {
    transport.expect_ok(CommandKind::EndSession, Response::EndSession);
}
