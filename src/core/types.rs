use bytes::Bytes;

/// Secret session token issued by the server on start-session.
///
/// The token is wire-level identity only. It is deliberately excluded from
/// `Debug` output so it cannot leak into logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Wire accessor for transport implementations. Do not log the value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(****)")
    }
}

/// Client-visible session identity.
///
/// Equals the request-id of the start-session response, not the secret
/// token used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pagination token for fetch-page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An opaque document value in the ledger's self-describing binary
/// encoding.
///
/// The driver never interprets the payload beyond byte identity (for the
/// commit digest) and a UTF-8 convenience read used when a statement is
/// known to return text values (e.g. table listings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(Bytes);

impl Document {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Read the payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Document {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<Vec<u8>> for Document {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

/// One page of statement output.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub values: Vec<Document>,
    pub next_page_token: Option<PageToken>,
}

impl Page {
    pub fn new(values: Vec<Document>, next_page_token: Option<PageToken>) -> Self {
        Self {
            values,
            next_page_token,
        }
    }
}

/// Cumulative server I/O counters for a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoUsage {
    pub read_ios: i64,
    pub write_ios: i64,
}

impl IoUsage {
    pub fn accumulate(&mut self, other: IoUsage) {
        self.read_ios += other.read_ios;
        self.write_ios += other.write_ios;
    }
}

/// Cumulative server-side processing time for a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingInformation {
    pub processing_time_ms: i64,
}

impl TimingInformation {
    pub fn accumulate(&mut self, other: TimingInformation) {
        self.processing_time_ms += other.processing_time_ms;
    }
}
