use std::error::Error as StdError;
use tracing::error;
use tracing_error::SpanTrace;

/// Actor handler failure, carrying the span trace of where it was raised.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct Error {
    source: ErrorKind,
    span_trace: SpanTrace,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Discovery(#[from] crate::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<crate::Error> for Error {
    fn from(source: crate::Error) -> Self {
        Self {
            source: ErrorKind::from(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Self {
            source: ErrorKind::from(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// Logs an actor error. Always returns `false`, keeping the actor alive.
pub fn handle_error(error: Box<dyn StdError + Send + Sync>) -> bool {
    let (error, span_trace) = match error.downcast_ref::<Error>() {
        Some(e) => (format!("{:?}", e.source), Some(&e.span_trace)),
        None => (format!("{:?}", error), None),
    };

    error!(
        "ActorError: {} SpanTrace: {}",
        error,
        span_trace
            .map(|st| format!("{}", st))
            .unwrap_or_else(|| String::from("None"))
    );

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_errors_keep_the_actor_running() {
        let error = Error::from(crate::Error::MissingMinimumSize("pool".into()));
        assert_eq!(error.to_string(), "no minimum size specified for vmss: pool");

        assert!(!handle_error(Box::new(error)));
        assert!(!handle_error("plain".into()));
    }
}
