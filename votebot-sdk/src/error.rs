//! Errors raised by the IRC client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Nickname does not match `[a-zA-Z0-9_-]+`.
    #[error("malformed nickname {0}")]
    InvalidNick(String),

    /// Channel name (without `#`) does not match `[a-zA-Z0-9_-]+`.
    #[error("malformed channel name {0}")]
    InvalidChannel(String),

    /// An event or outbound call needed a bot but none was assigned.
    #[error("no bot assigned to the IRC client")]
    NoBotAssigned,

    /// The outbound writer has stopped (after QUIT or a write failure).
    #[error("connection closed")]
    Closed,

    /// The session ended before the server sent `001`.
    #[error("registration failed: {0}")]
    Registration(String),

    #[error("invalid TLS server name {0}")]
    ServerName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
