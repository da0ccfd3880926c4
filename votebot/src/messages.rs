//! Message catalog for everything the bots say.
//!
//! Every message has a [`MessageKey`] and a canonical English pattern with
//! positional `{0}`, `{1}`… placeholders. A TOML file can override patterns
//! for another locale:
//!
//! ```toml
//! vote_started = "Abstimmung gestartet."
//! new_vote = "Neue Abstimmung: {0} hat eine Abstimmung über \"{1}\" gestartet"
//! ```
//!
//! The auditor parses the conductor's announcements and relies on the
//! English `new_vote` and `results_for_vote` prefixes.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    VoteStarted,
    VoteRunning,
    NoVoteRunning,
    NoVoteRunningPrivate,
    CannotCloseRunningVote,
    CountVote,
    CountProxyVote,
    VoteNotUnderstood,
    InvalidProxyVote,
    FinishingVote,
    NewVote,
    CastVoteInVoteChannel,
    CastVoteInNextSeconds,
    VotingWillEndInNSeconds,
    VotingHasClosed,
    ResultsForVote,
    UnknownCommand,
    HelpMessage,
    MissingTopic,
}

impl MessageKey {
    pub const ALL: [MessageKey; 19] = [
        MessageKey::VoteStarted,
        MessageKey::VoteRunning,
        MessageKey::NoVoteRunning,
        MessageKey::NoVoteRunningPrivate,
        MessageKey::CannotCloseRunningVote,
        MessageKey::CountVote,
        MessageKey::CountProxyVote,
        MessageKey::VoteNotUnderstood,
        MessageKey::InvalidProxyVote,
        MessageKey::FinishingVote,
        MessageKey::NewVote,
        MessageKey::CastVoteInVoteChannel,
        MessageKey::CastVoteInNextSeconds,
        MessageKey::VotingWillEndInNSeconds,
        MessageKey::VotingHasClosed,
        MessageKey::ResultsForVote,
        MessageKey::UnknownCommand,
        MessageKey::HelpMessage,
        MessageKey::MissingTopic,
    ];

    /// Name used in catalog files.
    pub fn name(self) -> &'static str {
        match self {
            MessageKey::VoteStarted => "vote_started",
            MessageKey::VoteRunning => "vote_running",
            MessageKey::NoVoteRunning => "no_vote_running",
            MessageKey::NoVoteRunningPrivate => "no_vote_running_private",
            MessageKey::CannotCloseRunningVote => "cannot_close_running_vote",
            MessageKey::CountVote => "count_vote",
            MessageKey::CountProxyVote => "count_proxy_vote",
            MessageKey::VoteNotUnderstood => "vote_not_understood",
            MessageKey::InvalidProxyVote => "invalid_proxy_vote",
            MessageKey::FinishingVote => "finishing_vote",
            MessageKey::NewVote => "new_vote",
            MessageKey::CastVoteInVoteChannel => "cast_vote_in_vote_channel",
            MessageKey::CastVoteInNextSeconds => "cast_vote_in_next_seconds",
            MessageKey::VotingWillEndInNSeconds => "voting_will_end_in_n_seconds",
            MessageKey::VotingHasClosed => "voting_has_closed",
            MessageKey::ResultsForVote => "results_for_vote",
            MessageKey::UnknownCommand => "unknown_command",
            MessageKey::HelpMessage => "help_message",
            MessageKey::MissingTopic => "missing_topic",
        }
    }

    /// Canonical English pattern.
    pub fn default_pattern(self) -> &'static str {
        match self {
            MessageKey::VoteStarted => "Vote started.",
            MessageKey::VoteRunning => "Sorry, a vote is already running.",
            MessageKey::NoVoteRunning => "Sorry {0}, there is no vote running.",
            MessageKey::NoVoteRunningPrivate => "There is no vote running.",
            MessageKey::CannotCloseRunningVote => "Cannot close a vote that is still running.",
            MessageKey::CountVote => "Thank you {0}, your vote ({1}) has been counted.",
            MessageKey::CountProxyVote => {
                "Thank you {0}, your proxy vote for {1} ({2}) has been counted."
            }
            MessageKey::VoteNotUnderstood => {
                "Sorry {0}, I did not understand your vote. Please vote aye, naye or abstain."
            }
            MessageKey::InvalidProxyVote => {
                "Sorry {0}, I did not understand your proxy vote. Use: proxy <nick> <aye|naye|abstain>"
            }
            MessageKey::FinishingVote => "Finishing vote on {0} (stopped by {1}).",
            MessageKey::NewVote => "New Vote: {0} has started a vote on \"{1}\"",
            MessageKey::CastVoteInVoteChannel => "Please cast your vote in #{0}",
            MessageKey::CastVoteInNextSeconds => "Please cast your vote in the next {0} seconds.",
            MessageKey::VotingWillEndInNSeconds => "Voting on {0} will end in {1} seconds.",
            MessageKey::VotingHasClosed => "Voting on {0} has closed.",
            MessageKey::ResultsForVote => "Results: for {0}:",
            MessageKey::UnknownCommand => {
                "Unknown command \"{0}\". Send \"help\" for a list of commands."
            }
            MessageKey::HelpMessage => {
                "Available commands:\n\
                 vote <topic>  start a vote on <topic>\n\
                 cancel        finish the running vote early\n\
                 help          show this message\n\
                 \n\
                 Ballots are cast in the vote channel: aye, naye or abstain.\n\
                 Vote for someone else with: proxy <nick> <aye|naye|abstain>"
            }
            MessageKey::MissingTopic => "Please give a topic: vote <topic>",
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read message catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("message catalog is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Message patterns, defaulting to English.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    overrides: HashMap<MessageKey, String>,
}

impl Catalog {
    /// The canonical English catalog.
    pub fn english() -> Self {
        Self::default()
    }

    /// Catalog with overrides from a flat TOML table. Unknown keys are an
    /// error.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let overrides: HashMap<MessageKey, String> = toml::from_str(text)?;
        Ok(Self { overrides })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The pattern for `key`.
    pub fn t(&self, key: MessageKey) -> &str {
        self.overrides
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_pattern())
    }

    /// The pattern for `key` with its placeholders filled in.
    pub fn format(&self, key: MessageKey, args: &[&dyn Display]) -> String {
        format_pattern(self.t(key), args)
    }
}

/// Replace `{n}` with the `n`th argument. Anything else, including
/// out-of-range placeholders, is copied verbatim.
pub fn format_pattern(pattern: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let arg = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            args.get(index).map(|arg| (arg, close))
        });
        match arg {
            Some((arg, close)) => {
                out.push_str(&arg.to_string());
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
