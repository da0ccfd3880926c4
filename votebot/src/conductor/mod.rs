//! The conductor: runs votes on behalf of the meeting.
//!
//! Commands arrive by private message (`vote <topic>`, `cancel`, `help`),
//! ballots arrive on the vote channel, and a timer task drives the warning,
//! the timeout and the published results. Every announcement goes to the
//! meeting channel first, then to the vote channel.

pub mod command;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use votebot_sdk::{Bot, ClientError, IrcClient};

use crate::mechanics::{VoteMechanics, VoteState};
use crate::messages::{Catalog, MessageKey};

use self::command::{VoteBotCommand, split_command};

/// How often the timer looks at the running vote.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Source recorded when the timer stops a vote.
const TIMEOUT_SOURCE: &str = "timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteBotConfig {
    /// Channel for announcements, without `#`.
    pub meeting_channel: String,
    /// Channel where ballots are cast, without `#`.
    pub vote_channel: String,
    pub warn_secs: u64,
    pub timeout_secs: u64,
}

impl Default for VoteBotConfig {
    fn default() -> Self {
        Self {
            meeting_channel: "meeting".to_string(),
            vote_channel: "vote".to_string(),
            warn_secs: 90,
            timeout_secs: 120,
        }
    }
}

pub struct VoteBot {
    config: VoteBotConfig,
    mechanics: Arc<VoteMechanics>,
    client: Arc<IrcClient>,
    messages: Arc<Catalog>,
    /// Serializes handlers and timer ticks. Taken before the mechanics lock.
    turn: Mutex<()>,
}

impl VoteBot {
    pub fn new(
        config: VoteBotConfig,
        mechanics: Arc<VoteMechanics>,
        client: Arc<IrcClient>,
        messages: Arc<Catalog>,
    ) -> Self {
        Self {
            config,
            mechanics,
            client,
            messages,
            turn: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &VoteBotConfig {
        &self.config
    }

    /// Join both channels.
    pub fn join_channels(&self) -> Result<(), ClientError> {
        self.client.join(&self.config.meeting_channel)?;
        self.client.join(&self.config.vote_channel)
    }

    /// Send `message` to the meeting channel, then to the vote channel.
    pub fn announce(&self, message: &str) -> Result<(), ClientError> {
        self.client.send(message, &self.config.meeting_channel)?;
        self.client.send(message, &self.config.vote_channel)
    }

    fn start_vote(&self, from: &str, topic: &str) -> Result<(), ClientError> {
        if topic.is_empty() {
            return self
                .client
                .send_private(self.messages.t(MessageKey::MissingTopic), from);
        }

        let reply = self
            .mechanics
            .call_vote(topic, self.config.warn_secs, self.config.timeout_secs);
        self.client.send_private(&reply.text, from)?;
        if !reply.accepted {
            return Ok(());
        }

        tracing::info!(topic, by = from, "Vote called");
        self.announce(&self.messages.format(MessageKey::NewVote, &[&from, &topic]))?;
        self.client.send(
            &self
                .messages
                .format(MessageKey::CastVoteInVoteChannel, &[&self.config.vote_channel]),
            &self.config.meeting_channel,
        )?;
        self.client.send(
            &self
                .messages
                .format(MessageKey::CastVoteInNextSeconds, &[&self.config.timeout_secs]),
            &self.config.vote_channel,
        )
    }

    fn cancel_vote(&self, from: &str) -> Result<(), ClientError> {
        match self.mechanics.stop_vote(from) {
            Ok(message) => {
                tracing::info!(by = from, "Vote cancelled");
                self.announce(&message)?;
                self.client.send_private(&message, from)
            }
            Err(e) => self.client.send_private(&e.to_string(), from),
        }
    }

    /// Advance time-based transitions as of `now`.
    pub fn tick(&self, now: Instant) -> Result<(), ClientError> {
        let _turn = self.turn.lock();
        let snapshot = self.mechanics.snapshot();

        match snapshot.state {
            VoteState::Idle => Ok(()),
            VoteState::Running => {
                if snapshot.end_at.is_some_and(|end| now >= end) {
                    match self.mechanics.stop_vote(TIMEOUT_SOURCE) {
                        Ok(message) => self.announce(&message),
                        // Someone cancelled between the snapshot and here.
                        Err(e) => {
                            tracing::debug!(error = %e, "Timeout lost to cancel");
                            Ok(())
                        }
                    }
                } else if !snapshot.warned && snapshot.warn_at.is_some_and(|warn| now >= warn) {
                    let remaining = self.config.timeout_secs.saturating_sub(self.config.warn_secs);
                    self.announce(&self.messages.format(
                        MessageKey::VotingWillEndInNSeconds,
                        &[&snapshot.topic, &remaining],
                    ))?;
                    self.mechanics.mark_warned();
                    Ok(())
                } else {
                    Ok(())
                }
            }
            VoteState::Stopping => self.publish_results(&snapshot.topic),
        }
    }

    fn publish_results(&self, topic: &str) -> Result<(), ClientError> {
        self.announce(&self.messages.format(MessageKey::VotingHasClosed, &[&topic]))?;
        let results = match self.mechanics.close_vote() {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot close vote");
                return Ok(());
            }
        };
        tracing::info!(topic, results = ?results, "Vote closed");
        self.announce(&self.messages.format(MessageKey::ResultsForVote, &[&topic]))?;
        for line in &results {
            self.announce(line)?;
        }
        Ok(())
    }

    /// Tick once per [`TICK_INTERVAL`] until the client closes.
    pub async fn run_timer(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.client.closed() => break,
            }
            if let Err(e) = self.tick(Instant::now()) {
                tracing::error!(error = %e, "Timer tick failed");
            }
        }
        tracing::debug!("Timer stopped");
    }
}

impl Bot for VoteBot {
    fn public_message(&self, from: &str, channel: &str, message: &str) -> Result<(), ClientError> {
        if channel != self.config.vote_channel {
            return Ok(());
        }
        let _turn = self.turn.lock();
        let reply = self.mechanics.evaluate_vote(from, message);
        self.client.send(&reply.text, &self.config.vote_channel)
    }

    fn private_message(&self, from: &str, message: &str) -> Result<(), ClientError> {
        let Some((word, rest)) = split_command(message) else {
            return Ok(());
        };
        let _turn = self.turn.lock();
        match word.parse::<VoteBotCommand>() {
            Ok(VoteBotCommand::Vote) => self.start_vote(from, rest),
            Ok(VoteBotCommand::Help) => self
                .client
                .send_private(self.messages.t(MessageKey::HelpMessage), from),
            Ok(VoteBotCommand::Cancel) => self.cancel_vote(from),
            Err(()) => self
                .client
                .send_private(&self.messages.format(MessageKey::UnknownCommand, &[&word]), from),
        }
    }
}
