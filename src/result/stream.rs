use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::types::{Document, Page, PageToken, TransactionId};
use crate::core::{DriverError, IoUsage, Result, TimingInformation};
use crate::session::Session;

/// Cumulative server statistics for one executed statement.
///
/// Shared between the statement handle and its stream so that totals keep
/// growing as pages are fetched. Both counters stay `None` until the
/// server first reports them.
#[derive(Debug, Default, Clone)]
pub(crate) struct ExecutionStats {
    io: Option<IoUsage>,
    timing: Option<TimingInformation>,
}

impl ExecutionStats {
    pub(crate) fn absorb(&mut self, io: Option<IoUsage>, timing: Option<TimingInformation>) {
        if let Some(io) = io {
            self.io.get_or_insert_with(IoUsage::default).accumulate(io);
        }
        if let Some(timing) = timing {
            self.timing
                .get_or_insert_with(TimingInformation::default)
                .accumulate(timing);
        }
    }
}

type SharedStats = Arc<Mutex<ExecutionStats>>;

/// Handle to the output of one executed statement.
///
/// The underlying stream may be taken exactly once, either directly with
/// [`stream`](Self::stream) or implicitly by [`buffer`](Self::buffer); a
/// second attempt fails with [`DriverError::ResultConsumed`]. Statistics
/// remain readable on the handle after the stream has been taken and keep
/// growing while the stream fetches pages.
#[derive(Debug)]
pub struct StatementResult {
    stream: Option<ResultStream>,
    stats: SharedStats,
}

impl StatementResult {
    pub(crate) fn new(
        session: Arc<Session>,
        transaction_id: TransactionId,
        first_page: Page,
        io: Option<IoUsage>,
        timing: Option<TimingInformation>,
    ) -> Self {
        let stats: SharedStats = Arc::new(Mutex::new(ExecutionStats::default()));
        stats.lock().absorb(io, timing);
        Self {
            stream: Some(ResultStream {
                session,
                transaction_id,
                current: first_page.values.into(),
                next_token: first_page.next_page_token,
                stats: stats.clone(),
                dead: false,
            }),
            stats,
        }
    }

    /// Take the single-use stream over the statement output.
    pub fn stream(&mut self) -> Result<ResultStream> {
        self.stream.take().ok_or(DriverError::ResultConsumed)
    }

    /// Drain the stream into a re-enumerable buffer.
    pub async fn buffer(&mut self) -> Result<BufferedResult> {
        let mut stream = self.stream()?;
        let mut values = Vec::new();
        while let Some(value) = stream.next().await? {
            values.push(value);
        }
        let stats = self.stats.lock().clone();
        Ok(BufferedResult {
            values,
            io: stats.io,
            timing: stats.timing,
        })
    }

    /// Cumulative read/write I/O reported by the server so far, if any.
    pub fn consumed_ios(&self) -> Option<IoUsage> {
        self.stats.lock().io
    }

    /// Cumulative server processing time reported so far, if any.
    pub fn timing_information(&self) -> Option<TimingInformation> {
        self.stats.lock().timing
    }
}

/// Lazy, forward-only cursor over paginated statement output.
///
/// Values are yielded from the in-memory page; when it runs out and a
/// next-page token is present, the next page is fetched through the owning
/// session. A fetch failure is surfaced as-is and leaves the stream dead.
#[derive(Debug)]
pub struct ResultStream {
    session: Arc<Session>,
    transaction_id: TransactionId,
    current: VecDeque<Document>,
    next_token: Option<PageToken>,
    stats: SharedStats,
    dead: bool,
}

impl ResultStream {
    /// Next value, or `None` when the output is exhausted.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        if self.dead {
            return Err(DriverError::IllegalState(
                "result stream failed on a previous page fetch".into(),
            ));
        }
        loop {
            if let Some(value) = self.current.pop_front() {
                return Ok(Some(value));
            }
            let Some(token) = self.next_token.take() else {
                return Ok(None);
            };
            match self.session.fetch_page(&self.transaction_id, token).await {
                Ok(output) => {
                    self.stats
                        .lock()
                        .absorb(output.consumed_ios, output.timing_information);
                    self.current = output.page.values.into();
                    self.next_token = output.page.next_page_token;
                }
                Err(error) => {
                    self.dead = true;
                    return Err(error);
                }
            }
        }
    }

    pub fn consumed_ios(&self) -> Option<IoUsage> {
        self.stats.lock().io
    }

    pub fn timing_information(&self) -> Option<TimingInformation> {
        self.stats.lock().timing
    }
}

/// Fully materialized statement output.
///
/// Unlike [`ResultStream`], a buffered result can be enumerated any number
/// of times. Produced by [`StatementResult::buffer`] and by driver
/// utilities that need the whole output (table listings).
#[derive(Debug, Clone)]
pub struct BufferedResult {
    values: Vec<Document>,
    io: Option<IoUsage>,
    timing: Option<TimingInformation>,
}

impl BufferedResult {
    pub fn values(&self) -> &[Document] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn consumed_ios(&self) -> Option<IoUsage> {
        self.io
    }

    pub fn timing_information(&self) -> Option<TimingInformation> {
        self.timing
    }
}

impl IntoIterator for BufferedResult {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a BufferedResult {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
