//! Error types for the poly crate.

use std::fmt;

/// Result type for poly operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Something went wrong that doesn't fit any other category.
    Unknown,
    /// The catalog service returned an error status or an unreadable payload.
    Server,
    /// The request or the asset it refers to was malformed.
    InvalidInput,
    /// No API credential was configured.
    NotAuthorized,
    /// The underlying transfer failed, timed out or was cancelled.
    Transport,
}

/// Errors that can occur in poly operations.
#[derive(Debug)]
pub enum Error {
    /// No API key is configured for the session.
    NotAuthorized,
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// JSON decoding failed.
    Json {
        /// Context for where the error occurred.
        context: &'static str,
        /// The error message.
        message: String,
    },
    /// Invalid data in a request, response or asset.
    InvalidData {
        /// Context for where the error occurred.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
    /// A cache-only fetch found nothing in the cache.
    NotCached {
        /// The cache key that missed.
        key: String,
    },
    /// The transfer was cancelled before it settled.
    Cancelled {
        /// The URL that was being fetched.
        url: String,
    },
    /// Cache operation failed.
    Cache {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
    /// Writing a downloaded file to local storage failed.
    Storage {
        /// The path being written.
        path: String,
        /// The error message.
        message: String,
    },
    /// An unexpected internal failure.
    Unknown {
        /// Description of what happened.
        detail: String,
    },
}

impl Error {
    /// The caller-facing category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAuthorized => ErrorKind::NotAuthorized,
            Error::Http { .. } | Error::Cancelled { .. } => ErrorKind::Transport,
            Error::HttpStatus { .. } | Error::Json { .. } => ErrorKind::Server,
            Error::InvalidData { .. } | Error::NotCached { .. } => ErrorKind::InvalidInput,
            Error::Cache { .. } | Error::Storage { .. } | Error::Unknown { .. } => {
                ErrorKind::Unknown
            }
        }
    }

    /// Whether this error is the result of a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    pub(crate) fn invalid(context: &'static str, detail: impl Into<String>) -> Self {
        Error::InvalidData {
            context,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotAuthorized => write!(f, "not authorized: no api key configured"),
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Json { context, message } => {
                write!(f, "failed to decode {context}: {message}")
            }
            Error::InvalidData { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
            Error::NotCached { key } => write!(f, "no cached data for {key}"),
            Error::Cancelled { url } => write!(f, "request to {url} was cancelled"),
            Error::Cache { operation, message } => {
                write!(f, "cache {operation} failed: {message}")
            }
            Error::Storage { path, message } => {
                write!(f, "failed to store {path}: {message}")
            }
            Error::Unknown { detail } => write!(f, "unknown error: {detail}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidData {
            context: "url",
            detail: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json {
            context: "json",
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::NotAuthorized.kind(), ErrorKind::NotAuthorized);
        assert_eq!(
            Error::NotCached { key: "k".into() }.kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            Error::HttpStatus {
                url: "u".into(),
                status: 500
            }
            .kind(),
            ErrorKind::Server
        );
        assert_eq!(
            Error::Cancelled { url: "u".into() }.kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::Storage {
                path: "p".into(),
                message: "m".into()
            }
            .kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_url_parse_error_is_invalid_input() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().starts_with("invalid url"));
    }

    #[test]
    fn test_display() {
        let err = Error::HttpStatus {
            url: "https://x/a.obj".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "http request to https://x/a.obj returned status 404"
        );
        assert!(Error::Cancelled { url: "u".into() }.is_cancelled());
    }
}
