//! The auditor: replays a conductor's vote and checks its published results.
//!
//! The auditor listens on the vote channel. When the target announces a new
//! vote it starts one on its own [`VoteMechanics`], every ballot it sees is
//! replayed there, and once the target has published one result line per
//! [`VoteKind`] the two tallies are compared line by line.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use votebot_sdk::{Bot, ClientError};

use crate::mechanics::VoteMechanics;
use crate::vote_kind::VoteKind;

const NEW_VOTE_PREFIX: &str = "New Vote: ";
const RESULTS_PREFIX: &str = "Results: ";

static NEW_VOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^New Vote: (.*) has started a vote on "(.*)"$"#).unwrap());

/// Source recorded when the auditor stops its replayed vote.
const AUDIT_SOURCE: &str = "audit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Published and replayed tallies agree.
    Passed,
    Failed {
        published: Vec<String>,
        computed: Vec<String>,
    },
    /// Results were published for a vote the auditor never saw start.
    Unobserved,
}

#[derive(Debug)]
enum Mode {
    Watching,
    Capturing(Vec<String>),
}

#[derive(Debug)]
struct AuditState {
    mode: Mode,
    last_outcome: Option<AuditOutcome>,
}

pub struct VoteAuditor {
    target_nick: String,
    vote_channel: String,
    mechanics: VoteMechanics,
    state: Mutex<AuditState>,
}

impl VoteAuditor {
    /// `mechanics` must not be shared with the conductor being audited.
    pub fn new(target_nick: &str, vote_channel: &str, mechanics: VoteMechanics) -> Self {
        Self {
            target_nick: target_nick.to_string(),
            vote_channel: vote_channel.to_string(),
            mechanics,
            state: Mutex::new(AuditState {
                mode: Mode::Watching,
                last_outcome: None,
            }),
        }
    }

    pub fn vote_channel(&self) -> &str {
        &self.vote_channel
    }

    pub fn mechanics(&self) -> &VoteMechanics {
        &self.mechanics
    }

    /// Outcome of the most recent completed audit.
    pub fn last_outcome(&self) -> Option<AuditOutcome> {
        self.state.lock().last_outcome.clone()
    }

    /// Feed one channel message. Returns the outcome when it completes an
    /// audit.
    pub fn observe(&self, from: &str, message: &str) -> Option<AuditOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let from_target = from == self.target_nick;

        match &mut state.mode {
            Mode::Watching if from_target => {
                if message.starts_with(NEW_VOTE_PREFIX) {
                    self.start_replay(message);
                } else if message.starts_with(RESULTS_PREFIX) {
                    tracing::info!(header = message, "detected vote-end");
                    state.mode = Mode::Capturing(Vec::with_capacity(VoteKind::COUNT));
                }
                None
            }
            Mode::Watching => {
                let reply = self.mechanics.evaluate_vote(from, message);
                tracing::debug!(
                    voter = from,
                    accepted = reply.accepted,
                    ballots = %self.mechanics.current_result(),
                    "Replayed ballot"
                );
                None
            }
            Mode::Capturing(captured) if from_target => {
                captured.push(message.to_string());
                if captured.len() < VoteKind::COUNT {
                    return None;
                }
                let published = std::mem::take(captured);
                state.mode = Mode::Watching;
                let outcome = self.reconcile(published);
                state.last_outcome = Some(outcome.clone());
                Some(outcome)
            }
            Mode::Capturing(_) => {
                tracing::info!(voter = from, message, "vote after end");
                None
            }
        }
    }

    fn start_replay(&self, announcement: &str) {
        let Some(caps) = NEW_VOTE_RE.captures(announcement) else {
            tracing::warn!(announcement, "Cannot parse new vote announcement");
            return;
        };
        let topic = &caps[2];
        let reply = self.mechanics.call_vote(topic, 0, 0);
        if reply.accepted {
            tracing::info!(topic, by = &caps[1], "detected vote-start");
        } else {
            tracing::warn!(topic, reply = %reply, "Replay already running");
        }
    }

    fn reconcile(&self, published: Vec<String>) -> AuditOutcome {
        let computed = match self
            .mechanics
            .stop_vote(AUDIT_SOURCE)
            .and_then(|_| self.mechanics.close_vote())
        {
            Ok(computed) => computed.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, published = ?published, "Results for a vote that was not observed");
                return AuditOutcome::Unobserved;
            }
        };

        if published == computed {
            tracing::info!(results = ?computed, "audit successful");
            AuditOutcome::Passed
        } else {
            tracing::warn!(published = ?published, computed = ?computed, "audit failed");
            AuditOutcome::Failed {
                published,
                computed,
            }
        }
    }
}

impl Bot for VoteAuditor {
    fn public_message(&self, from: &str, channel: &str, message: &str) -> Result<(), ClientError> {
        if channel == self.vote_channel {
            self.observe(from, message);
        }
        Ok(())
    }

    fn private_message(&self, from: &str, _message: &str) -> Result<(), ClientError> {
        tracing::debug!(from, "Ignoring private message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mechanics::VoteState;
    use crate::messages::Catalog;

    fn auditor() -> VoteAuditor {
        VoteAuditor::new("votebot", "vote", VoteMechanics::new(Arc::new(Catalog::english())))
    }

    #[test]
    fn parses_new_vote_announcement() {
        let caps = NEW_VOTE_RE
            .captures("New Vote: alice has started a vote on \"Is it a vote?\"")
            .unwrap();
        assert_eq!(&caps[1], "alice");
        assert_eq!(&caps[2], "Is it a vote?");
    }

    #[test]
    fn ignores_target_chatter() {
        let subject = auditor();
        assert_eq!(subject.observe("votebot", "Thank you alice, your vote (AYE) has been counted."), None);
        assert_eq!(subject.mechanics().state(), VoteState::Idle);
    }

    #[test]
    fn malformed_announcement_starts_nothing() {
        let subject = auditor();
        subject.observe("votebot", "New Vote: garbled");
        assert_eq!(subject.mechanics().state(), VoteState::Idle);
    }
}
