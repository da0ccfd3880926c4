//! The handler bound to an [`IrcClient`](crate::client::IrcClient).

use crate::error::ClientError;

/// Receives events dispatched by the client's reader task.
///
/// Methods run on the reader task itself, one line at a time, so an
/// implementation sees lines in receipt order. They may call back into the
/// client (`send`, `send_private`): outbound writes go through a queue and
/// never wait on the reader.
pub trait Bot: Send + Sync {
    /// A message to `#channel` (passed without the `#`).
    fn public_message(&self, from: &str, channel: &str, message: &str) -> Result<(), ClientError>;

    /// A message addressed to us directly.
    fn private_message(&self, from: &str, message: &str) -> Result<(), ClientError>;

    fn join(&self, _nick: &str, _channel: &str) {}

    fn part(&self, _nick: &str, _channel: &str) {}
}
