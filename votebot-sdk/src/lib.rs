//! votebot-sdk: the chat plumbing shared by the vote conductor and auditor.
//!
//! Provides a CRLF line codec, a parser from raw server lines to events, and
//! an IRC client that registers, keeps channel membership, answers PINGs and
//! dispatches messages into a bound [`bot::Bot`].

pub mod bot;
pub mod client;
pub mod codec;
pub mod error;
pub mod event;
pub mod transcript;

pub use bot::Bot;
pub use client::{ConnectConfig, IrcClient};
pub use error::ClientError;
pub use transcript::Transcript;
