use thiserror::Error;

/// Result type alias for aggregator operations
pub type Result<T, E = AggregatorError> = std::result::Result<T, E>;

/// Errors that can occur while serving or fanning out requests
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("failed to read response body: {0}")]
    ResponseBody(String),

    #[error("upstream request failed for {0}: {1}")]
    UpstreamRequest(String, String),

    #[error("upstream timeout for {0}")]
    UpstreamTimeout(String),

    #[error("upstream returned status {1} for {0}")]
    UpstreamStatus(String, u16),

    #[error("malformed upstream payload from {0}: {1}")]
    UpstreamPayload(String, String),

    #[error("response serialization error: {0}")]
    ResponseSerialization(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
