use thiserror::Error;

/// Concrete errors that occur within crow's HTTP implementation
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// the request could not be parsed; the connection closes without a
    /// response
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// a static file response pointed at a path that could not be opened
    #[error("could not open static file {0}")]
    StaticFile(String),
}

/// Parse failures latched by [`HttpParser`][crate::HttpParser]. Once one of
/// these has been returned, further `feed` calls are no-ops until the parser
/// is cleared.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// the request method was not one of the recognized verbs
    #[error("invalid HTTP method")]
    InvalidMethod,

    /// a url byte failed the RFC character table
    #[error("invalid character in url")]
    InvalidUrl,

    /// the version portion of the request line was malformed or unsupported
    #[error("invalid HTTP version")]
    InvalidVersion,

    /// the status line of a response was malformed
    #[error("invalid status line")]
    InvalidStatus,

    /// a header name contained a non-token byte
    #[error("invalid character in header name")]
    InvalidHeaderToken,

    /// the `Content-Length` value was not a number, or two conflicting
    /// values were provided
    #[error("invalid Content-Length")]
    InvalidContentLength,

    /// both `Content-Length` and `Transfer-Encoding` were present
    #[error("unexpected Content-Length alongside Transfer-Encoding")]
    UnexpectedContentLength,

    /// the request line plus headers exceeded the configured octet limit
    #[error("header block exceeds maximum size")]
    HeaderOverflow,

    /// a chunk size line was not valid hex
    #[error("invalid chunk size")]
    InvalidChunkSize,

    /// a required literal byte (CR, LF, or part of `HTTP/`) was missing
    #[error("expected protocol constant")]
    InvalidConstant,

    /// end of input arrived in the middle of a message
    #[error("connection closed mid-message")]
    InvalidEofState,

    /// `feed` was called after an error without an intervening `clear`
    #[error("parser is in a failed state")]
    Dead,
}

/// this crate's result type
pub type Result<T> = std::result::Result<T, Error>;
