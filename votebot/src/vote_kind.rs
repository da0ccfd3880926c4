//! Ballot values and the words that spell them.

use std::fmt;
use std::str::FromStr;

use crate::mechanics::VoteError;

/// A ballot value. Declaration order is the order results are published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VoteKind {
    Aye,
    Naye,
    Abstain,
}

impl VoteKind {
    pub const COUNT: usize = 3;
    pub const ALL: [VoteKind; Self::COUNT] = [VoteKind::Aye, VoteKind::Naye, VoteKind::Abstain];

    pub fn name(self) -> &'static str {
        match self {
            VoteKind::Aye => "AYE",
            VoteKind::Naye => "NAYE",
            VoteKind::Abstain => "ABSTAIN",
        }
    }

    /// Lowercase words counted as this kind.
    pub fn variants(self) -> &'static [&'static str] {
        match self {
            VoteKind::Aye => &["aye", "yes", "oui", "ja"],
            VoteKind::Naye => &["naye", "nay", "no", "non", "nein"],
            VoteKind::Abstain => &["abstain", "enthaltung", "abs"],
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Classify a word, ignoring case and surrounding whitespace.
    pub fn classify(word: &str) -> Result<VoteKind, VoteError> {
        let normalized = word.trim().to_lowercase();
        VoteKind::ALL
            .into_iter()
            .find(|kind| kind.variants().contains(&normalized.as_str()))
            .ok_or_else(|| VoteError::Unrecognized(word.to_string()))
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoteKind {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoteKind::classify(s)
    }
}
