use replay_api::{CloseReason, SinkError, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("source: {0}")]
    Source(SourceError),

    #[error("sink: {0}")]
    Sink(SinkError),
}

impl ReplayError {
    /// Причина закрытия, которую видит подписчик.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            ReplayError::Source(_) => CloseReason::SourceError,
            ReplayError::Sink(SinkError::Closed) => CloseReason::PeerDisconnected,
            ReplayError::Sink(SinkError::Encode(_)) => CloseReason::EncodeError,
        }
    }
}
