use nimbus_auth::AuthError;
use nimbus_http::HttpError;
use thiserror::Error;

/// Broad classes of [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file could not be opened: bad URL, scheme or configuration, or
    /// the server would not report a size
    Initialization,
    /// Credentials were missing or rejected
    Authentication,
    /// A read or seek could not be satisfied
    Read,
    /// The network exchange itself failed
    Transport,
}

/// Errors that can occur while opening or reading a remote file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    /// The URL could not be parsed as an object location
    #[error("Invalid location {0}")]
    InvalidLocation(String),

    /// The URL scheme is not one of the supported schemes
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The size request was not answered with 200
    #[error("Cannot determine size of {url}: server answered with status {status}")]
    SizeDiscovery {
        /// The file URL
        url: String,
        /// The response status
        status: u16,
    },

    /// The size response had no usable Content-Length
    #[error("Cannot determine size of {0}: response has no Content-Length")]
    MissingContentLength(String),

    /// Credentials could not be resolved or were rejected
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A read extends past the end of the file
    #[error("Read of {length} bytes at offset {offset} exceeds file size {size}")]
    OutOfBounds {
        /// Requested offset
        offset: u64,
        /// Requested length
        length: u64,
        /// File size
        size: u64,
    },

    /// A range request was not answered with 206
    #[error("Range request answered with status {status} instead of 206")]
    RangeNotHonored {
        /// The response status
        status: u16,
    },

    /// The declared response length differs from the requested length
    #[error("Range response declares {declared:?} bytes, expected {expected}")]
    LengthMismatch {
        /// Requested length
        expected: u64,
        /// Content-Length of the response, if any
        declared: Option<u64>,
    },

    /// The response body ended early
    #[error("Range response delivered {actual} of {expected} bytes")]
    ShortBody {
        /// Requested length
        expected: u64,
        /// Bytes actually received
        actual: u64,
    },

    /// The buffer cannot hold every requested range
    #[error("Buffer of {available} bytes cannot hold {needed} requested bytes")]
    BufferTooSmall {
        /// Total length of the requested ranges
        needed: u64,
        /// Buffer length
        available: u64,
    },

    /// A seek would move the cursor to an invalid position
    #[error("Invalid seek: {0}")]
    InvalidSeek(String),

    /// The file has been closed
    #[error("File is closed")]
    Closed,

    /// The network exchange failed
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl FileError {
    /// The class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileError::InvalidLocation(_)
            | FileError::UnsupportedScheme(_)
            | FileError::InvalidConfig(_)
            | FileError::SizeDiscovery { .. }
            | FileError::MissingContentLength(_) => ErrorKind::Initialization,
            FileError::Auth(AuthError::Http(error)) | FileError::Http(error) => match error {
                HttpError::UnsupportedScheme(_)
                | HttpError::TlsUnavailable(_)
                | HttpError::InvalidProxy(_)
                | HttpError::MissingServer => ErrorKind::Initialization,
                _ => ErrorKind::Transport,
            },
            FileError::Auth(_) => ErrorKind::Authentication,
            FileError::OutOfBounds { .. }
            | FileError::RangeNotHonored { .. }
            | FileError::LengthMismatch { .. }
            | FileError::ShortBody { .. }
            | FileError::BufferTooSmall { .. }
            | FileError::InvalidSeek(_)
            | FileError::Closed => ErrorKind::Read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_errors() {
        assert_eq!(
            FileError::SizeDiscovery {
                url: "http://h/f".into(),
                status: 404
            }
            .kind(),
            ErrorKind::Initialization
        );
        assert_eq!(
            FileError::Auth(AuthError::MissingCredentials("none".into())).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            FileError::Auth(AuthError::Http(HttpError::Connect("refused".into()))).kind(),
            ErrorKind::Transport
        );
        assert_eq!(FileError::RangeNotHonored { status: 200 }.kind(), ErrorKind::Read);
        assert_eq!(
            FileError::Http(HttpError::TlsUnavailable("https://h:443".into())).kind(),
            ErrorKind::Initialization
        );
        assert_eq!(
            FileError::Http(HttpError::Timeout("slow".into())).kind(),
            ErrorKind::Transport
        );
    }
}
