use thiserror::Error;

/// Failures that can end a synthesis stream.
///
/// Display strings are sent to clients verbatim, so they stay short and never
/// carry paths, URLs or credentials. Details belong in the logs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TtsError {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("unreachable")]
    EngineUnreachable,

    #[error("timeout")]
    EngineTimeout,

    #[error("engine error {status}: {detail}")]
    EngineError { status: u16, detail: String },

    #[error("invalid input: {0}")]
    InputError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("upstream text generation failed: {0}")]
    UpstreamError(String),

    #[error("wav encoding failed: {0}")]
    EncodingError(String),
}

impl TtsError {
    /// Error for a remote body that was truncated to keep messages small.
    pub(crate) fn engine_error(status: u16, body: &str) -> Self {
        const MAX_DETAIL: usize = 200;
        let detail: String = body.trim().chars().take(MAX_DETAIL).collect();
        TtsError::EngineError { status, detail }
    }
}
