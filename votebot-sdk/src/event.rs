//! Parsing raw server lines into the events the client acts on.
//!
//! Only the RFC 1459 subset the bots need is understood: `PING`, numeric
//! `001`, `PRIVMSG`, `JOIN` and `PART`. Everything else comes back as
//! [`Event::Other`] so the reader can log it.

use thiserror::Error;

/// A line whose prefix or fields are not shaped as expected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}: {line}")]
pub struct MalformedLine {
    pub reason: &'static str,
    pub line: String,
}

impl MalformedLine {
    fn new(reason: &'static str, line: &str) -> Self {
        Self {
            reason,
            line: line.to_string(),
        }
    }
}

/// Events produced by the reader loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Server keep-alive; answered with `PONG <payload>`.
    Ping { payload: String },

    /// Numeric `001`: registration is complete.
    Registered,

    /// A PRIVMSG to a channel. `channel` has its `#` removed.
    ChannelMessage {
        from: String,
        channel: String,
        text: String,
    },

    /// A PRIVMSG addressed to a nick (normally ours).
    PrivateMessage {
        from: String,
        target: String,
        text: String,
    },

    /// Someone joined a channel. `channel` has its `#` removed.
    Joined { nick: String, channel: String },

    /// Someone left a channel. `channel` has its `#` removed.
    Parted { nick: String, channel: String },

    /// Any command the client does not handle.
    Other { command: String },
}

impl Event {
    /// Transcript file key for events that are recorded.
    ///
    /// Channels keep their `#`, private messages use the bare target nick.
    pub fn transcript_key(&self) -> Option<String> {
        match self {
            Event::ChannelMessage { channel, .. }
            | Event::Joined { channel, .. }
            | Event::Parted { channel, .. } => Some(format!("#{channel}")),
            Event::PrivateMessage { target, .. } => Some(target.clone()),
            _ => None,
        }
    }

    /// The three-digit reply code, if this is a numeric we do not handle.
    pub fn numeric(&self) -> Option<&str> {
        match self {
            Event::Other { command }
                if command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Some(command)
            }
            _ => None,
        }
    }
}

/// Parse one line (without CRLF) received from the server.
pub fn parse(line: &str) -> Result<Event, MalformedLine> {
    if let Some(payload) = line.strip_prefix("PING ") {
        return Ok(Event::Ping {
            payload: payload.to_string(),
        });
    }

    let (prefix, rest) = if line.starts_with(':') {
        match line.split_once(' ') {
            Some((prefix, rest)) => (Some(prefix), rest),
            None => (Some(line), ""),
        }
    } else {
        (None, line)
    };

    let mut fields = rest.splitn(3, ' ');
    let command = fields.next().unwrap_or("");
    let arg1 = fields.next();
    let arg2 = fields.next();

    match command {
        "001" => Ok(Event::Registered),
        "PRIVMSG" => {
            let target = arg1
                .filter(|t| !t.is_empty())
                .ok_or_else(|| MalformedLine::new("PRIVMSG without target", line))?;
            let body = arg2.ok_or_else(|| MalformedLine::new("PRIVMSG without text", line))?;
            let text = body.strip_prefix(':').unwrap_or(body).to_string();
            let from = sender_nick(prefix, line)?;
            match target.strip_prefix('#') {
                Some(channel) => Ok(Event::ChannelMessage {
                    from,
                    channel: channel.to_string(),
                    text,
                }),
                None => Ok(Event::PrivateMessage {
                    from,
                    target: target.to_string(),
                    text,
                }),
            }
        }
        "JOIN" => {
            let channel = channel_arg(arg1, line)?;
            let nick = sender_nick(prefix, line)?;
            Ok(Event::Joined { nick, channel })
        }
        "PART" => {
            let channel = channel_arg(arg1, line)?;
            let nick = sender_nick(prefix, line)?;
            Ok(Event::Parted { nick, channel })
        }
        other => Ok(Event::Other {
            command: other.to_string(),
        }),
    }
}

/// `:nick!user@host` → `nick`. A prefix without the leading `:` is malformed.
fn sender_nick(prefix: Option<&str>, line: &str) -> Result<String, MalformedLine> {
    let referent = prefix.unwrap_or("");
    let head = referent.split('!').next().unwrap_or("");
    match head.strip_prefix(':') {
        Some(nick) if !nick.is_empty() => Ok(nick.to_string()),
        _ => Err(MalformedLine::new("missing sender prefix", line)),
    }
}

/// `#chan`, `:#chan` → `chan`.
fn channel_arg(arg: Option<&str>, line: &str) -> Result<String, MalformedLine> {
    let raw = arg
        .filter(|a| !a.is_empty())
        .ok_or_else(|| MalformedLine::new("missing channel", line))?;
    let raw = raw.strip_prefix(':').unwrap_or(raw);
    Ok(raw.strip_prefix('#').unwrap_or(raw).to_string())
}
