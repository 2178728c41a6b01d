use thiserror::Error;

/// Errors that can occur while establishing sessions and exchanging
/// requests with a server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The server URL uses a scheme other than `http` or `https`
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// HTTPS was requested but the transport has no TLS support
    #[error("HTTPS requested for {0} but the transport does not support TLS")]
    TlsUnavailable(String),

    /// The proxy URL is not a plain `http` URL
    #[error("Invalid proxy URL {0}: only http proxies are supported")]
    InvalidProxy(String),

    /// A request was made before any server URL was set
    #[error("No server URL has been set for this session")]
    MissingServer,

    /// A header name or value could not be sent on the wire
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Why the header was rejected
        reason: String,
    },

    /// The connection to the server could not be established
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The connection or request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The TLS configuration could not be built or the handshake failed
    #[error("TLS failure: {0}")]
    Tls(String),

    /// The server closed a reused connection before answering
    #[error("Connection closed before response: {0}")]
    Retry(String),

    /// Any other transport failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Reading the response body failed
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// A request decorator refused to prepare the request
    #[error("Failed to prepare request: {0}")]
    Decorator(String),
}

impl HttpError {
    /// Returns true for failures that warrant resending the same request on
    /// a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpError::Retry(_))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(error: reqwest::Error) -> Self {
        let message = describe(&error);
        if error.is_timeout() {
            HttpError::Timeout(message)
        } else if error.is_connect() {
            HttpError::Connect(message)
        } else if error.is_body() || error.is_decode() {
            HttpError::Body(message)
        } else if error.is_builder() {
            HttpError::Transport(message)
        } else if error.is_request() && is_stale_connection(&error) {
            HttpError::Retry(message)
        } else {
            HttpError::Transport(message)
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(error: std::io::Error) -> Self {
        HttpError::Body(error.to_string())
    }
}

/// Renders the error along with its source chain, since reqwest keeps the
/// interesting part (refused connection, certificate problem) in sources.
fn describe(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn is_stale_connection(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        if cause.to_string().contains("connection closed before message completed") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_only_retries_stale_connections() {
        assert!(HttpError::Retry("closed".into()).is_retryable());
        assert!(!HttpError::Connect("refused".into()).is_retryable());
        assert!(!HttpError::Timeout("slow".into()).is_retryable());
    }

    #[test]
    fn it_formats_messages() {
        let error = HttpError::InvalidHeader {
            name: "x-bad".into(),
            reason: "contains newline".into(),
        };
        assert_eq!(error.to_string(), "Invalid header x-bad: contains newline");
        assert_eq!(
            HttpError::InvalidProxy("https://proxy:3128/".into()).to_string(),
            "Invalid proxy URL https://proxy:3128/: only http proxies are supported"
        );
    }
}
