//! Commands accepted by private message.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteBotCommand {
    Vote,
    Help,
    Cancel,
}

impl FromStr for VoteBotCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VOTE" => Ok(VoteBotCommand::Vote),
            "HELP" => Ok(VoteBotCommand::Help),
            "CANCEL" => Ok(VoteBotCommand::Cancel),
            _ => Err(()),
        }
    }
}

/// Split a private message into its command word and the rest.
pub fn split_command(message: &str) -> Option<(&str, &str)> {
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    Some(match message.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (message, ""),
    })
}
