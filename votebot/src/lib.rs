//! votebot: an IRC vote conductor and an independent vote auditor.
//!
//! Both bots sit on top of `votebot-sdk` and share the vote mechanics:
//! - Conductor: runs a timed vote, announces it, publishes the tally
//! - Auditor: replays the ballots it sees and checks the published tally

pub mod auditor;
pub mod conductor;
pub mod config;
pub mod mechanics;
pub mod messages;
pub mod vote_kind;
