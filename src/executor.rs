// ============================================================================
// Transaction Execution Loop
// ============================================================================
//
// Drives one user closure to a committed result: acquire a session, start
// a transaction, run the closure, commit, and replay on retriable failures
// according to the caller's retry policy. Sole authority on retries; every
// other layer re-raises errors unchanged.
//
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::error::classify;
use crate::core::types::TransactionId;
use crate::core::{DriverError, Result};
use crate::retry::RetryPolicy;
use crate::session::pool::SessionPool;
use crate::session::Session;
use crate::transaction::{Transaction, TransactionState, TransactionView};

/// One attempt's failure, annotated with what the retry loop needs: the
/// envelope of transaction id, session liveness, and retriability computed
/// once at classification time.
struct FailedAttempt {
    error: DriverError,
    transaction_id: Option<TransactionId>,
    session_alive: bool,
    retriable: bool,
}

/// Run `f` inside a transaction, committing on success and retrying per
/// `policy`.
///
/// Session plumbing across attempts: an alive session goes back to the
/// pool and the next attempt re-acquires (often getting the same session
/// back); a dead one is discarded so the next attempt opens a fresh one.
/// The pool permit is bound to the checked-out session, so permits-held
/// never exceeds capacity at any await point, and dropping the future at
/// any await point frees the permit.
pub(crate) async fn execute_with_retry<F, Fut, R>(
    pool: &SessionPool,
    policy: &RetryPolicy,
    f: &F,
) -> Result<R>
where
    F: Fn(TransactionView) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut attempt: u32 = 0;
    let mut retries_left = policy.max_retries();

    loop {
        attempt += 1;

        let pooled = match pool.acquire().await {
            Ok(pooled) => pooled,
            Err(error @ (DriverError::DriverClosed | DriverError::PoolTimeout(_))) => {
                return Err(error);
            }
            // Session creation failed. The permit is already released;
            // the failure is retriable with no session held, since a
            // fresh attempt may well reach the server.
            Err(error) => {
                let failed = FailedAttempt {
                    error,
                    transaction_id: None,
                    session_alive: false,
                    retriable: true,
                };
                consult_policy(policy, attempt, &mut retries_left, failed).await?;
                continue;
            }
        };

        let failed = match run_attempt(pooled.session(), f).await {
            Ok(value) => {
                pool.release(pooled, true).await;
                return Ok(value);
            }
            Err(failed) => failed,
        };

        pool.release(pooled, failed.session_alive).await;

        consult_policy(policy, attempt, &mut retries_left, failed).await?;
    }
}

/// Decide between retrying (after backoff) and surfacing the error.
///
/// Attempt 1 always runs; each retry consumes budget, except the grace
/// retry granted when the very first attempt fails with InvalidSession:
/// a pooled session may have silently expired, and replaying once on a
/// fresh session should not count against the caller.
async fn consult_policy(
    policy: &RetryPolicy,
    attempt: u32,
    retries_left: &mut u32,
    failed: FailedAttempt,
) -> Result<()> {
    let grace = attempt == 1
        && failed.retriable
        && matches!(failed.error, DriverError::InvalidSession(_));

    if !failed.retriable || (!grace && *retries_left == 0) {
        debug!(
            attempt,
            transaction_id = ?failed.transaction_id,
            error = %failed.error,
            "surfacing error"
        );
        return Err(failed.error);
    }
    if !grace {
        *retries_left -= 1;
    }

    let delay = policy.delay_for(attempt, &failed.error);
    warn!(
        attempt,
        transaction_id = ?failed.transaction_id,
        session_alive = failed.session_alive,
        delay_ms = delay.as_millis() as u64,
        error = %failed.error,
        "retrying transaction"
    );
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

/// One attempt: start a transaction, run the closure, commit.
///
/// On failure the error is classified exactly once, an abort is sent
/// best-effort while the session is still believed alive, and the final
/// liveness verdict is carried in the envelope.
async fn run_attempt<F, Fut, R>(
    session: &Arc<Session>,
    f: &F,
) -> std::result::Result<R, FailedAttempt>
where
    F: Fn(TransactionView) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let txn = match Transaction::start(session.clone()).await {
        Ok(txn) => Arc::new(txn),
        Err(error) => {
            let disposition = classify(&error);
            return Err(FailedAttempt {
                error,
                transaction_id: None,
                session_alive: disposition.session_alive,
                retriable: disposition.retriable,
            });
        }
    };

    let outcome = f(TransactionView::new(txn.clone())).await;

    // An explicit abort inside the closure is terminal regardless of what
    // the closure returned.
    if txn.state() == TransactionState::Aborted {
        return Err(FailedAttempt {
            error: DriverError::TransactionAborted(txn.id().clone()),
            transaction_id: Some(txn.id().clone()),
            session_alive: txn.session_alive(),
            retriable: false,
        });
    }

    let error = match outcome {
        Ok(value) => match txn.commit().await {
            Ok(()) => return Ok(value),
            Err(error) => error,
        },
        Err(error) => error,
    };

    let disposition = classify(&error);
    let mut session_alive = disposition.session_alive;
    if session_alive {
        txn.abort().await;
        session_alive = txn.session_alive();
    }

    Err(FailedAttempt {
        error,
        transaction_id: Some(txn.id().clone()),
        session_alive,
        retriable: disposition.retriable,
    })
}
