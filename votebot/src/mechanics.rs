//! The vote state machine.
//!
//! ```text
//! IDLE --call_vote--> RUNNING --stop_vote--> STOPPING --close_vote--> IDLE
//! ```
//!
//! One [`VoteMechanics`] owns at most one vote session. Every operation takes
//! the same lock, so concurrent callers (the reader task and the conductor's
//! timer) observe the transitions atomically. Operations in the wrong state
//! never change anything: `call_vote` and `evaluate_vote` answer with a
//! rejected [`Reply`], `stop_vote` and `close_vote` fail with
//! [`VoteError::State`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;

use crate::messages::{Catalog, MessageKey};
use crate::vote_kind::VoteKind;

static PROXY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*proxy\s").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Number of whitespace-separated tokens in `proxy <voter> <value>`.
const PROXY_PART_COUNT: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoteError {
    /// The ballot word is not one of the known variants.
    #[error("{0} is no valid vote")]
    Unrecognized(String),

    /// Operation called in the wrong state. Carries the localized message.
    #[error("{0}")]
    State(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for VoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoteState::Idle => "IDLE",
            VoteState::Running => "RUNNING",
            VoteState::Stopping => "STOPPING",
        })
    }
}

/// Answer to `call_vote` or `evaluate_vote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Whether the operation changed anything.
    pub accepted: bool,
    pub text: String,
}

impl Reply {
    fn accepted(text: String) -> Self {
        Self { accepted: true, text }
    }

    fn rejected(text: String) -> Self {
        Self {
            accepted: false,
            text,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A running or stopping vote.
#[derive(Debug, Clone)]
struct Session {
    topic: String,
    ballots: BTreeMap<String, VoteKind>,
    warn_at: Instant,
    end_at: Instant,
    warned: bool,
}

/// State, topic, deadlines and warn latch read under one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: VoteState,
    pub topic: String,
    pub warn_at: Option<Instant>,
    pub end_at: Option<Instant>,
    pub warned: bool,
}

#[derive(Debug)]
struct Inner {
    state: VoteState,
    session: Option<Session>,
}

pub struct VoteMechanics {
    inner: Mutex<Inner>,
    messages: Arc<Catalog>,
}

impl VoteMechanics {
    pub fn new(messages: Arc<Catalog>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: VoteState::Idle,
                session: None,
            }),
            messages,
        }
    }

    /// Start a vote on `topic`.
    ///
    /// The warning is due `warn_secs` and the end `timeout_secs` from now;
    /// zero makes a deadline due immediately. With `warn_secs` past
    /// `timeout_secs` the end comes first and the warning never fires.
    pub fn call_vote(&self, topic: &str, warn_secs: u64, timeout_secs: u64) -> Reply {
        self.call_vote_at(topic, warn_secs, timeout_secs, Instant::now())
    }

    pub fn call_vote_at(&self, topic: &str, warn_secs: u64, timeout_secs: u64, now: Instant) -> Reply {
        let mut inner = self.inner.lock();
        if inner.state != VoteState::Idle {
            return Reply::rejected(self.messages.t(MessageKey::VoteRunning).to_string());
        }

        inner.session = Some(Session {
            topic: topic.to_string(),
            ballots: BTreeMap::new(),
            warn_at: now + Duration::from_secs(warn_secs),
            end_at: now + Duration::from_secs(timeout_secs),
            warned: false,
        });
        inner.state = VoteState::Running;
        tracing::debug!(topic, "Vote started");

        Reply::accepted(self.messages.t(MessageKey::VoteStarted).to_string())
    }

    /// Record a ballot from `actor`, interpreting `proxy <voter> <value>`.
    pub fn evaluate_vote(&self, actor: &str, text: &str) -> Reply {
        let mut inner = self.inner.lock();
        let running = inner.state == VoteState::Running;
        let Some(session) = inner.session.as_mut().filter(|_| running) else {
            return Reply::rejected(self.messages.format(MessageKey::NoVoteRunning, &[&actor]));
        };

        let (voter, value) = if PROXY_RE.is_match(&text.to_lowercase()) {
            let parts = proxy_parts(text);
            if parts.len() != PROXY_PART_COUNT {
                return Reply::rejected(self.messages.format(MessageKey::InvalidProxyVote, &[&actor]));
            }
            (parts[1], parts[2])
        } else {
            (actor, text.trim())
        };

        let kind = match VoteKind::classify(value) {
            Ok(kind) => kind,
            Err(_) => {
                return Reply::rejected(self.messages.format(MessageKey::VoteNotUnderstood, &[&actor]));
            }
        };

        session.ballots.insert(voter.to_string(), kind);
        let text = if voter == actor {
            self.messages.format(MessageKey::CountVote, &[&actor, &kind])
        } else {
            self.messages.format(MessageKey::CountProxyVote, &[&actor, &voter, &kind])
        };
        Reply::accepted(text)
    }

    /// Move a running vote to STOPPING. `source` names who stopped it
    /// (a nick, or `timeout`).
    pub fn stop_vote(&self, source: &str) -> Result<String, VoteError> {
        let mut inner = self.inner.lock();
        let topic = match (inner.state, inner.session.as_ref()) {
            (VoteState::Running, Some(session)) => session.topic.clone(),
            _ => {
                return Err(VoteError::State(
                    self.messages.t(MessageKey::NoVoteRunningPrivate).to_string(),
                ));
            }
        };
        inner.state = VoteState::Stopping;
        Ok(self.messages.format(MessageKey::FinishingVote, &[&topic, &source]))
    }

    /// Tally a stopped vote and return to IDLE.
    ///
    /// Element `i` is `"<KIND>: <count>"` for `VoteKind::ALL[i]`.
    pub fn close_vote(&self) -> Result<[String; VoteKind::COUNT], VoteError> {
        let mut inner = self.inner.lock();
        if inner.state != VoteState::Stopping {
            return Err(VoteError::State(
                self.messages.t(MessageKey::CannotCloseRunningVote).to_string(),
            ));
        }

        let mut counts = [0usize; VoteKind::COUNT];
        if let Some(session) = inner.session.take() {
            for kind in session.ballots.values() {
                counts[kind.index()] += 1;
            }
        }
        inner.state = VoteState::Idle;

        Ok(VoteKind::ALL.map(|kind| format!("{}: {}", kind, counts[kind.index()])))
    }

    /// Latch the warning as sent. Callers check `warned` and the deadline
    /// first.
    pub fn mark_warned(&self) {
        if let Some(session) = self.inner.lock().session.as_mut() {
            session.warned = true;
        }
    }

    pub fn state(&self) -> VoteState {
        self.inner.lock().state
    }

    /// Topic of the current vote, empty when idle.
    pub fn topic(&self) -> String {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.topic.clone())
            .unwrap_or_default()
    }

    pub fn warn_at(&self) -> Option<Instant> {
        self.inner.lock().session.as_ref().map(|s| s.warn_at)
    }

    pub fn end_at(&self) -> Option<Instant> {
        self.inner.lock().session.as_ref().map(|s| s.end_at)
    }

    pub fn warned(&self) -> bool {
        self.inner.lock().session.as_ref().is_some_and(|s| s.warned)
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let session = inner.session.as_ref();
        Snapshot {
            state: inner.state,
            topic: session.map(|s| s.topic.clone()).unwrap_or_default(),
            warn_at: session.map(|s| s.warn_at),
            end_at: session.map(|s| s.end_at),
            warned: session.is_some_and(|s| s.warned),
        }
    }

    /// Ballots so far as `{alice=AYE, bob=NAYE}`, ordered by voter.
    pub fn current_result(&self) -> String {
        let inner = self.inner.lock();
        let entries: Vec<String> = inner
            .session
            .iter()
            .flat_map(|s| s.ballots.iter())
            .map(|(voter, kind)| format!("{voter}={kind}"))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    /// Number of voters with a ballot.
    pub fn ballot_count(&self) -> usize {
        self.inner
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.ballots.len())
    }
}

/// Split a proxy ballot on whitespace runs. Leading whitespace yields an
/// empty first token, trailing empty tokens are dropped.
fn proxy_parts(text: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = WHITESPACE_RE.split(text).collect();
    while parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mechanics() -> VoteMechanics {
        VoteMechanics::new(Arc::new(Catalog::english()))
    }

    fn msg(key: MessageKey, args: &[&dyn fmt::Display]) -> String {
        Catalog::english().format(key, args)
    }

    #[test]
    fn no_vote_running() {
        let subject = mechanics();
        let reply = subject.evaluate_vote("alice", "test");
        assert!(!reply.accepted);
        assert_eq!(reply.text, msg(MessageKey::NoVoteRunning, &[&"alice"]));
        assert_eq!(subject.state(), VoteState::Idle);
        assert_eq!(subject.topic(), "");
    }

    #[test]
    fn call_vote_starts_running() {
        let subject = mechanics();
        let reply = subject.call_vote("test vote", 90, 120);
        assert!(reply.accepted);
        assert_eq!(reply.text, "Vote started.");
        assert_eq!(subject.topic(), "test vote");
        assert_eq!(subject.state(), VoteState::Running);
        assert!(!subject.warned());
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn deadlines_follow_the_arguments() {
        let subject = mechanics();
        let now = Instant::now();
        subject.call_vote_at("t", 30, 120, now);
        assert_eq!(subject.warn_at(), Some(now + Duration::from_secs(30)));
        assert_eq!(subject.end_at(), Some(now + Duration::from_secs(120)));
    }

    #[test]
    fn refuses_parallel_call_vote() {
        let subject = mechanics();
        let now = Instant::now();
        subject.call_vote_at("first", 30, 120, now);
        subject.evaluate_vote("alice", "aye");
        subject.mark_warned();
        let before = subject.snapshot();

        let reply = subject.call_vote_at("second", 1, 2, now + Duration::from_secs(5));
        assert!(!reply.accepted);
        assert_eq!(reply.text, "Sorry, a vote is already running.");
        assert_eq!(subject.snapshot(), before);
        assert_eq!(subject.current_result(), "{alice=AYE}");
    }

    #[test]
    fn refuses_call_vote_while_stopping() {
        let subject = mechanics();
        let now = Instant::now();
        subject.call_vote_at("first", 30, 120, now);
        subject.evaluate_vote("alice", "naye");
        subject.mark_warned();
        subject.stop_vote("bob").unwrap();
        let before = subject.snapshot();
        assert_eq!(before.state, VoteState::Stopping);

        let reply = subject.call_vote_at("second", 1, 2, now + Duration::from_secs(5));
        assert!(!reply.accepted);
        assert_eq!(reply.text, "Sorry, a vote is already running.");
        assert_eq!(subject.snapshot(), before);
        assert_eq!(subject.current_result(), "{alice=NAYE}");
        assert_eq!(subject.close_vote().unwrap(), ["AYE: 0", "NAYE: 1", "ABSTAIN: 0"]);
    }

    #[test]
    fn counts_a_vote() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "aye");
        assert!(reply.accepted);
        assert_eq!(reply.text, msg(MessageKey::CountVote, &[&"alice", &"AYE"]));
        assert_eq!(subject.current_result(), "{alice=AYE}");
    }

    #[test]
    fn counts_a_proxy_vote_for_the_voter() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "proxy bob aye");
        assert_eq!(reply.text, msg(MessageKey::CountProxyVote, &[&"alice", &"bob", &"AYE"]));
        assert_eq!(subject.current_result(), "{bob=AYE}");
    }

    #[test]
    fn proxy_keyword_is_case_insensitive() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "PROXY Bob No");
        assert!(reply.accepted);
        assert_eq!(subject.current_result(), "{Bob=NAYE}");
    }

    #[test]
    fn proxy_with_leading_whitespace_is_invalid() {
        let subject = mechanics();
        subject.call_vote("t", 90, 120);
        for text in ["  proxy bob aye", "\tPROXY Bob No"] {
            let reply = subject.evaluate_vote("alice", text);
            assert!(!reply.accepted);
            assert_eq!(reply.text, msg(MessageKey::InvalidProxyVote, &[&"alice"]));
        }
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn proxy_tolerates_trailing_whitespace() {
        let subject = mechanics();
        subject.call_vote("t", 90, 120);
        assert!(subject.evaluate_vote("alice", "proxy bob  aye  ").accepted);
        assert_eq!(subject.current_result(), "{bob=AYE}");
    }

    #[test]
    fn proxy_parts_keep_a_leading_empty_token() {
        assert_eq!(proxy_parts("proxy bob aye"), ["proxy", "bob", "aye"]);
        assert_eq!(proxy_parts(" proxy bob aye"), ["", "proxy", "bob", "aye"]);
        assert_eq!(proxy_parts("proxy bob aye \t"), ["proxy", "bob", "aye"]);
        assert_eq!(proxy_parts("proxy "), ["proxy"]);
    }

    #[test]
    fn rejects_unknown_words() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "moo");
        assert!(!reply.accepted);
        assert_eq!(reply.text, msg(MessageKey::VoteNotUnderstood, &[&"alice"]));
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn later_vote_replaces_earlier() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        subject.evaluate_vote("alice", "aye");
        assert_eq!(subject.current_result(), "{alice=AYE}");
        let reply = subject.evaluate_vote("alice", "naye");
        assert_eq!(reply.text, msg(MessageKey::CountVote, &[&"alice", &"NAYE"]));
        assert_eq!(subject.current_result(), "{alice=NAYE}");
    }

    #[test]
    fn invalid_vote_keeps_previous_ballot() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        subject.evaluate_vote("alice", "aye");
        subject.evaluate_vote("alice", "moo");
        assert_eq!(subject.current_result(), "{alice=AYE}");
    }

    #[test]
    fn proxy_with_unknown_word_is_not_understood() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "proxy bob moo");
        assert_eq!(reply.text, msg(MessageKey::VoteNotUnderstood, &[&"alice"]));
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn proxy_with_wrong_token_count_is_invalid() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        for text in ["proxy ", "proxy bob", "proxy bob aye now"] {
            let reply = subject.evaluate_vote("alice", text);
            assert!(!reply.accepted);
            assert_eq!(reply.text, msg(MessageKey::InvalidProxyVote, &[&"alice"]));
        }
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn proxy_needs_whitespace_after_keyword() {
        let subject = mechanics();
        subject.call_vote("test", 90, 120);
        let reply = subject.evaluate_vote("alice", "proxybob");
        assert_eq!(reply.text, msg(MessageKey::VoteNotUnderstood, &[&"alice"]));
    }

    #[test]
    fn close_fresh_vote() {
        let subject = mechanics();
        subject.call_vote("fresh vote", 90, 120);
        subject.stop_vote("test").unwrap();
        assert_eq!(subject.close_vote().unwrap(), ["AYE: 0", "NAYE: 0", "ABSTAIN: 0"]);
        assert_eq!(subject.topic(), "");
        assert_eq!(subject.state(), VoteState::Idle);
    }

    #[test]
    fn close_vote_tallies_final_ballots() {
        let subject = mechanics();
        subject.call_vote("fresh vote", 30, 120);
        subject.evaluate_vote("alice", "AyE");
        subject.evaluate_vote("bob", "NaYe");
        subject.evaluate_vote("claire", "yes");
        subject.evaluate_vote("debra", "abs");
        subject.evaluate_vote("alice", "proxy mike no");
        subject.evaluate_vote("debra", "ja");
        subject.evaluate_vote("malory", "evil");

        assert_eq!(
            subject.current_result(),
            "{alice=AYE, bob=NAYE, claire=AYE, debra=AYE, mike=NAYE}"
        );
        assert_eq!(
            subject.stop_vote("test").unwrap(),
            "Finishing vote on fresh vote (stopped by test)."
        );
        assert_eq!(subject.close_vote().unwrap(), ["AYE: 3", "NAYE: 2", "ABSTAIN: 0"]);
        assert_eq!(subject.topic(), "");
        assert_eq!(subject.state(), VoteState::Idle);
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn results_do_not_depend_on_arrival_order() {
        let ballots = [("alice", "aye"), ("bob", "no"), ("carol", "abs"), ("dave", "yes")];

        let forward = mechanics();
        forward.call_vote("t", 0, 0);
        for (voter, value) in ballots {
            forward.evaluate_vote(voter, value);
        }
        let backward = mechanics();
        backward.call_vote("t", 0, 0);
        for (voter, value) in ballots.iter().rev() {
            backward.evaluate_vote(voter, value);
        }

        forward.stop_vote("x").unwrap();
        backward.stop_vote("x").unwrap();
        assert_eq!(forward.close_vote().unwrap(), backward.close_vote().unwrap());
    }

    #[test]
    fn stop_requires_running_vote() {
        let subject = mechanics();
        assert_eq!(
            subject.stop_vote("x"),
            Err(VoteError::State("There is no vote running.".to_string()))
        );

        subject.call_vote("t", 0, 0);
        subject.stop_vote("x").unwrap();
        assert!(matches!(subject.stop_vote("y"), Err(VoteError::State(_))));
        assert_eq!(subject.state(), VoteState::Stopping);
    }

    #[test]
    fn close_requires_stopping_vote() {
        let subject = mechanics();
        subject.call_vote("t", 0, 0);
        assert_eq!(
            subject.close_vote(),
            Err(VoteError::State(
                "Cannot close a vote that is still running.".to_string()
            ))
        );
        assert_eq!(subject.state(), VoteState::Running);
        assert_eq!(subject.topic(), "t");
    }

    #[test]
    fn no_ballots_while_stopping() {
        let subject = mechanics();
        subject.call_vote("t", 0, 0);
        subject.stop_vote("x").unwrap();
        let reply = subject.evaluate_vote("alice", "aye");
        assert!(!reply.accepted);
        assert_eq!(subject.current_result(), "{}");
    }

    #[test]
    fn warn_latch_is_reset_by_the_next_vote() {
        let subject = mechanics();
        subject.call_vote("t", 0, 0);
        subject.mark_warned();
        assert!(subject.warned());
        subject.stop_vote("x").unwrap();
        subject.close_vote().unwrap();
        assert!(!subject.warned());
        subject.call_vote("u", 0, 0);
        assert!(!subject.warned());
    }

    #[test]
    fn snapshot_reads_everything_at_once() {
        let subject = mechanics();
        assert_eq!(
            subject.snapshot(),
            Snapshot {
                state: VoteState::Idle,
                topic: String::new(),
                warn_at: None,
                end_at: None,
                warned: false,
            }
        );
        let now = Instant::now();
        subject.call_vote_at("budget", 5, 10, now);
        let snapshot = subject.snapshot();
        assert_eq!(snapshot.state, VoteState::Running);
        assert_eq!(snapshot.topic, "budget");
        assert_eq!(snapshot.end_at, Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn concurrent_voters_each_get_one_ballot() {
        let subject = Arc::new(mechanics());
        subject.call_vote("t", 0, 60);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let subject = subject.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let value = if round % 2 == 0 { "aye" } else { "no" };
                        subject.evaluate_vote(&format!("voter{i}"), value);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(subject.ballot_count(), 8);
        subject.stop_vote("x").unwrap();
        // 50 rounds end on an odd round, so everyone last voted "no".
        assert_eq!(subject.close_vote().unwrap(), ["AYE: 0", "NAYE: 8", "ABSTAIN: 0"]);
    }
}
