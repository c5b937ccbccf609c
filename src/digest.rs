// ============================================================================
// Commit Digest Accumulator
// ============================================================================
//
// Maintains the running 32-byte hash transmitted as the expected commit
// digest. The server computes the same value independently and rejects the
// commit if the two disagree.
//
// ============================================================================

use sha2::{Digest, Sha256};

use crate::core::types::{Document, TransactionId};

pub const DIGEST_LEN: usize = 32;

/// Running commit digest for one transaction.
///
/// Seeded with `SHA-256(utf8(transaction_id))`; folded once per executed
/// statement:
///
/// ```text
/// h' = SHA-256( dot(h, SHA-256(utf8(statement) ++ SHA-256(param_0) ++ ...)) )
/// ```
///
/// where `dot(a, b)` concatenates the two hashes sorted by unsigned
/// lexicographic byte order, smaller first. The sort makes `dot`
/// commutative and keeps the digest reproducible across platforms.
///
/// Pure and deterministic; performs no I/O.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommitDigest([u8; DIGEST_LEN]);

impl CommitDigest {
    /// Initial digest for a freshly started transaction.
    pub fn seed(transaction_id: &TransactionId) -> Self {
        Self(sha256(transaction_id.as_bytes()))
    }

    /// Fold one executed statement into the digest.
    pub fn update(&mut self, statement: &str, parameters: &[Document]) {
        let mut hasher = Sha256::new();
        hasher.update(statement.as_bytes());
        for param in parameters {
            hasher.update(sha256(param.as_slice()));
        }
        let statement_hash: [u8; DIGEST_LEN] = hasher.finalize().into();
        self.0 = sha256(&dot(&self.0, &statement_hash));
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Rebuild a digest from the server's echo. Fails on length mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let array: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl std::fmt::Debug for CommitDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommitDigest(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

fn sha256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(bytes).into()
}

/// Concatenate two hashes sorted by unsigned lexicographic byte order,
/// smaller first. Unsigned comparison is what keeps the result identical
/// on every platform.
fn dot(a: &[u8; DIGEST_LEN], b: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN * 2] {
    let (lo, hi) = if a.as_slice() <= b.as_slice() {
        (a, b)
    } else {
        (b, a)
    };
    let mut joined = [0u8; DIGEST_LEN * 2];
    joined[..DIGEST_LEN].copy_from_slice(lo);
    joined[DIGEST_LEN..].copy_from_slice(hi);
    joined
}
