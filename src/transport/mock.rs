//! Scripted in-memory transport for tests.
//!
//! The driver's integration scenarios run against this instead of a real
//! wire: a queue of expected steps is prepared up front, and every command
//! the driver sends is recorded for later assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Command, CommandKind, LedgerTransport, Reply, Response, TransportError};

struct ScriptStep {
    expected: CommandKind,
    result: Result<Response, TransportError>,
}

/// A transport that replays a prepared script.
///
/// Each step is bound to a command kind. A command whose kind matches the
/// head of the script consumes that step; any other command receives an
/// `Io` error without consuming the script. Best-effort paths (abort on
/// error, end-session on discard) swallow those errors, so scripts only
/// need to cover the commands a scenario actually asserts on.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptStep>>,
    log: Mutex<Vec<Command>>,
    request_counter: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a successful step for the given command kind.
    pub fn expect_ok(&self, kind: CommandKind, response: Response) {
        self.push(kind, Ok(response));
    }

    /// Append a failing step for the given command kind.
    pub fn expect_err(&self, kind: CommandKind, error: TransportError) {
        self.push(kind, Err(error));
    }

    fn push(&self, expected: CommandKind, result: Result<Response, TransportError>) {
        self.script.lock().push_back(ScriptStep { expected, result });
    }

    /// Every command the driver sent, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.log.lock().clone()
    }

    /// Count of sent commands of one kind.
    pub fn count(&self, kind: CommandKind) -> usize {
        self.commands().iter().filter(|c| c.kind() == kind).count()
    }

    /// Number of unconsumed script steps.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl LedgerTransport for MockTransport {
    async fn send(&self, command: Command) -> Result<Reply, TransportError> {
        let kind = command.kind();
        self.log.lock().push(command);

        let mut script = self.script.lock();
        let head_matches = script
            .front()
            .map(|step| step.expected == kind)
            .unwrap_or(false);
        if !head_matches {
            return Err(TransportError::Io(format!("unscripted command: {kind}")));
        }

        let Some(step) = script.pop_front() else {
            return Err(TransportError::Io("mock script exhausted".into()));
        };
        let request_id = format!(
            "request-{}",
            self.request_counter.fetch_add(1, Ordering::SeqCst) + 1
        );
        step.result.map(|response| Reply {
            request_id,
            response,
        })
    }
}
