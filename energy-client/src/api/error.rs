/// Failures surfaced by the remote metering API adapter.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Neither a token nor a username/password pair was supplied.
    #[error("no authentication token or username/password provided")]
    MissingCredentials,
    #[error("authentication failed with status {status}")]
    Authentication { status: u16 },
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
    #[error("request to {url} failed with status {status}")]
    RequestFailed { url: String, status: u16 },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// True for failures a caller may reasonably skip past (one window, one
    /// resource) rather than abort on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Connection { .. } | ApiError::InvalidResponse { .. } | ApiError::RequestFailed { .. }
        )
    }
}
