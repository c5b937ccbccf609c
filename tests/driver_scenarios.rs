//! End-to-end scenarios against the scripted mock transport.

mod common;

use std::sync::Arc;

use ledger_driver::transport::mock::MockTransport;
use ledger_driver::transport::{Command, CommandKind, TransportError};
use ledger_driver::{
    DriverConfig, DriverError, LedgerDriver, RetryPolicy, ACTIVE_TABLES_STATEMENT,
};
use sha2::{Digest, Sha256};

use common::*;

const TID: &str = "testTransactionId12345";

fn driver_with(transport: Arc<MockTransport>, config: DriverConfig) -> LedgerDriver {
    LedgerDriver::new(config, transport).expect("valid config")
}

fn fast_config(max_retries: u32) -> DriverConfig {
    DriverConfig::new("test-ledger").retry_policy(RetryPolicy::no_delay(max_retries))
}

#[tokio::test]
async fn test_happy_path_list_table_names() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    expect_execute_values(&transport, &["table1", "table2"], None);
    expect_commit(&transport, TID, &[(ACTIVE_TABLES_STATEMENT, &[])]);

    let driver = driver_with(transport.clone(), DriverConfig::new("test-ledger"));
    let names = driver.list_table_names().await.unwrap();

    assert_eq!(names, vec!["table1", "table2"]);
    assert_eq!(driver.pool().idle_sessions(), 1);
    assert_eq!(driver.pool().available_permits(), driver.pool().capacity());
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn test_digest_reference_vector() {
    // A transaction that executed no statements commits with the SHA-256
    // of its id's UTF-8 bytes.
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    expect_commit(&transport, TID, &[]);

    let expected: [u8; 32] = Sha256::digest(TID.as_bytes()).into();
    assert_eq!(digest_after(TID, &[]).as_bytes(), &expected);

    let driver = driver_with(transport, DriverConfig::new("test-ledger"));
    driver.execute(|_txn| async move { Ok(()) }).await.unwrap();
}

#[tokio::test]
async fn test_occ_conflicts_retried_within_limit() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    for attempt in 1..=3 {
        expect_start_transaction(&transport, &format!("txn-{attempt}"));
        expect_execute_err(&transport, TransportError::OccConflict("conflict".into()));
        expect_abort(&transport);
    }
    expect_start_transaction(&transport, "txn-4");
    expect_execute_values(&transport, &[], None);
    expect_commit(&transport, "txn-4", &[("DELETE FROM vehicles", &[])]);

    let driver = driver_with(transport.clone(), fast_config(4));
    driver
        .execute(|txn| async move {
            txn.execute("DELETE FROM vehicles", Vec::new()).await?;
            Ok(())
        })
        .await
        .unwrap();

    // Exactly 4 attempts on one server session.
    assert_eq!(transport.count(CommandKind::StartTransaction), 4);
    assert_eq!(transport.count(CommandKind::StartSession), 1);
    assert_eq!(driver.pool().available_permits(), driver.pool().capacity());
}

#[tokio::test]
async fn test_invalid_session_retried_on_fresh_session() {
    let transport = mock_transport();
    expect_start_session(&transport, "token-1");
    expect_start_transaction_err(&transport, TransportError::InvalidSession("invalid session".into()));
    // The dead session is discarded (its end-session goes unscripted and
    // is swallowed); the retry opens a fresh one.
    expect_start_session(&transport, "token-2");
    expect_start_transaction(&transport, TID);
    expect_commit(&transport, TID, &[]);

    let driver = driver_with(transport.clone(), fast_config(4));
    driver.execute(|_txn| async move { Ok(()) }).await.unwrap();

    assert_eq!(transport.count(CommandKind::StartSession), 2);

    // Two distinct session tokens were used on the wire.
    let tokens: Vec<_> = transport
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::StartTransaction { session_token } => {
                Some(session_token.as_str().to_string())
            }
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["token-1", "token-2"]);
}

#[tokio::test]
async fn test_expired_transaction_is_fatal() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction_err(
        &transport,
        TransportError::InvalidSession("Transaction 324weqr2314 has expired".into()),
    );

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|_txn| async move { Ok(()) })
        .await
        .unwrap_err();

    match err {
        DriverError::InvalidSession(msg) => {
            assert_eq!(msg, "Transaction 324weqr2314 has expired");
        }
        other => panic!("expected InvalidSession, got {other:?}"),
    }
    // The dead session was discarded, not pooled.
    assert_eq!(driver.pool().idle_sessions(), 0);
    assert_eq!(driver.pool().available_permits(), driver.pool().capacity());
}

#[tokio::test]
async fn test_capacity_exceeded_exhausts_budget() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    for attempt in 1..=5 {
        expect_start_transaction(&transport, &format!("txn-{attempt}"));
        expect_execute_err(&transport, TransportError::CapacityExceeded("busy".into()));
        expect_abort(&transport);
    }

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|txn| async move {
            txn.execute("DELETE FROM vehicles", Vec::new()).await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::CapacityExceeded(_)));
    assert_eq!(transport.count(CommandKind::StartTransaction), 5);
    assert_eq!(driver.pool().available_permits(), driver.pool().capacity());
    // The session stayed alive throughout and went back to the pool.
    assert_eq!(driver.pool().idle_sessions(), 1);
}

#[tokio::test]
async fn test_execute_after_close_is_rejected() {
    let transport = mock_transport();
    let driver = driver_with(transport.clone(), DriverConfig::new("test-ledger"));

    driver.close().await;
    let err = driver
        .execute(|_txn| async move { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::DriverClosed));
    assert!(transport.commands().is_empty());

    // close is idempotent.
    driver.close().await;
    assert!(driver.is_closed());
}

#[tokio::test]
async fn test_user_abort_is_surfaced_without_retry() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    expect_abort(&transport);

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|txn| async move {
            txn.abort().await;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::TransactionAborted(_)));
    assert_eq!(transport.count(CommandKind::StartTransaction), 1);
    // The session is still usable after a clean abort.
    assert_eq!(driver.pool().idle_sessions(), 1);
}

#[tokio::test]
async fn test_http_5xx_retried_on_fresh_session() {
    let transport = mock_transport();
    expect_start_session(&transport, "token-1");
    expect_start_transaction_err(
        &transport,
        TransportError::Http {
            status: 503,
            message: "service unavailable".into(),
        },
    );
    expect_start_session(&transport, "token-2");
    expect_start_transaction(&transport, TID);
    expect_commit(&transport, TID, &[]);

    let driver = driver_with(transport.clone(), fast_config(4));
    driver.execute(|_txn| async move { Ok(()) }).await.unwrap();
    assert_eq!(transport.count(CommandKind::StartSession), 2);
}

#[tokio::test]
async fn test_http_4xx_is_surfaced() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    expect_execute_err(
        &transport,
        TransportError::BadRequest("malformed statement".into()),
    );
    expect_abort(&transport);

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|txn| async move {
            txn.execute("NOT PARTIQL", Vec::new()).await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::BadRequest(_)));
    assert_eq!(transport.count(CommandKind::StartTransaction), 1);
    // A malformed statement does not cost the session.
    assert_eq!(driver.pool().idle_sessions(), 1);
}

#[tokio::test]
async fn test_digest_mismatch_is_integrity_error() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    // Echo a digest for a different transcript.
    expect_commit(&transport, TID, &[("DELETE FROM other", &[])]);
    expect_abort(&transport);

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|_txn| async move { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::DigestMismatch { .. }));
    assert_eq!(transport.count(CommandKind::CommitTransaction), 1);
}

#[tokio::test]
async fn test_interrupted_commit_surfaces_indeterminate_outcome() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    transport.expect_err(
        CommandKind::CommitTransaction,
        TransportError::Io("connection reset during commit".into()),
    );

    let driver = driver_with(transport.clone(), fast_config(4));
    let err = driver
        .execute(|_txn| async move { Ok(()) })
        .await
        .unwrap_err();

    // Indeterminate outcome: never retried, session not reused.
    assert!(matches!(err, DriverError::CommitUnknown(_)));
    assert_eq!(transport.count(CommandKind::CommitTransaction), 1);
    assert_eq!(driver.pool().idle_sessions(), 0);
}

#[tokio::test]
async fn test_multi_page_results_are_drained() {
    let transport = mock_transport();
    expect_start_session(&transport, "t");
    expect_start_transaction(&transport, TID);
    expect_execute_values(&transport, &["table1"], Some("page-2"));
    expect_fetch_page(&transport, &["table2", "table3"], None);
    expect_commit(&transport, TID, &[(ACTIVE_TABLES_STATEMENT, &[])]);

    let driver = driver_with(transport.clone(), DriverConfig::new("test-ledger"));
    let names = driver.list_table_names().await.unwrap();

    assert_eq!(names, vec!["table1", "table2", "table3"]);
    assert_eq!(transport.count(CommandKind::FetchPage), 1);
}
