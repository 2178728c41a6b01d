use nimbus_http::HttpError;
use thiserror::Error;

/// Errors raised while resolving credentials or authenticating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// An option in the options string is malformed
    #[error("Invalid option {option}: {reason}")]
    InvalidOption {
        /// The offending option token
        option: String,
        /// What is wrong with it
        reason: String,
    },

    /// No usable credentials could be found
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The identity service URL is invalid
    #[error("Invalid identity service URL: {0}")]
    InvalidIdentityUrl(String),

    /// The identity API version in the auth URL is not supported
    #[error("Unsupported identity API version in {0}")]
    UnsupportedVersion(String),

    /// The identity service refused the exchange
    #[error("Identity service rejected authentication: {0}")]
    Rejected(String),

    /// The identity service answered with something unusable
    #[error("Malformed identity response: {0}")]
    MalformedResponse(String),

    /// A token expiry timestamp could not be parsed
    #[error("Invalid token expiry {0:?}")]
    InvalidExpiry(String),

    /// Authentication was needed before a request and failed
    #[error("Could not authenticate with server: {0}")]
    NotAuthenticated(String),

    /// The exchange with the identity service failed on the wire
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl From<AuthError> for HttpError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Http(error) => error,
            other => HttpError::Decorator(other.to_string()),
        }
    }
}
