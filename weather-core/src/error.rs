use thiserror::Error;

/// Coarse classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Provider(u16),
    Decode,
    Cancelled,
}

/// Typed failure for one city in one fetch cycle.
///
/// Carries owned messages rather than source errors so a single failure can be
/// handed to every caller waiting on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider responded with status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The payload did not match the expected shape.
    #[error("failed to decode provider payload: {0}")]
    Decode(String),

    /// The batch was aborted before this result was delivered.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::Provider { status, .. } => ErrorKind::Provider(*status),
            FetchError::Decode(_) => ErrorKind::Decode,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("unknown unit system '{0}'. Supported: metric, imperial, standard.")]
    UnknownUnitSystem(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
