mod error;
mod rate;
mod record;
mod sink;
mod source;

pub use error::{RateError, SinkError, SourceError};
pub use rate::Rate;
pub use record::{Record, SessionLog, TS_FIELD};
pub use sink::{CloseReason, ReplaySink};
pub use source::RecordSource;
