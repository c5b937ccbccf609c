mod stream;

pub use stream::{BufferedResult, ResultStream, StatementResult};
