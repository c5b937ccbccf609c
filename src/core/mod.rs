pub mod error;
pub mod types;

pub use error::{DriverError, Result};
pub use types::{
    Document, IoUsage, Page, PageToken, SessionId, SessionToken, TimingInformation, TransactionId,
};
