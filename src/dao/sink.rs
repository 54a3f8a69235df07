use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::MatchSummary;

/// Result alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Error raised by summary sinks regardless of the underlying medium.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not accept the summary.
    #[error("summary sink unavailable: {message}")]
    Unavailable {
        /// Human-readable failure description.
        message: String,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl SinkError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        SinkError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the durable destination for finished-match summaries.
///
/// Writes are fire-and-forget from the engine's perspective; a failing sink
/// never affects results already delivered in-session.
pub trait SummarySink: Send + Sync {
    /// Persist one finished-match summary.
    fn store(&self, summary: MatchSummary) -> BoxFuture<'static, SinkResult<()>>;
}
