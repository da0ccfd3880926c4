//! Startup arguments for the conductor and auditor binaries.
//!
//! clap's automatic `-h` is turned off because `-h` is the server host;
//! `--help` still prints usage.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};
use votebot_sdk::ConnectConfig;
use votebot_sdk::client::{DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT};

use crate::conductor::VoteBotConfig;
use crate::messages::{Catalog, CatalogError};

/// Connection flags shared by both bots.
#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// Hostname of the IRC server
    #[arg(short = 'h', long)]
    pub host: String,

    /// TCP port of the IRC server
    #[arg(short, long, default_value_t = DEFAULT_TLS_PORT)]
    pub port: u16,

    /// IRC nick name
    #[arg(short, long)]
    pub nick: String,

    #[arg(
        short = 'u',
        long = "no-ssl",
        help = format!("Disable TLS (plaintext servers usually listen on port {DEFAULT_PLAIN_PORT})")
    )]
    pub no_ssl: bool,

    /// Directory for per-channel transcripts
    #[arg(long, default_value = "irc")]
    pub transcript_dir: PathBuf,

    /// TOML file overriding message patterns
    #[arg(long, env = "VOTEBOT_MESSAGES")]
    pub messages: Option<PathBuf>,
}

impl ConnectArgs {
    pub fn connect_config(&self, realname: &str) -> ConnectConfig {
        ConnectConfig {
            host: self.host.clone(),
            port: self.port,
            nick: self.nick.clone(),
            realname: realname.to_string(),
            tls: !self.no_ssl,
        }
    }

    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.messages {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::english()),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "votebot", about = "Runs timed votes in an IRC channel", disable_help_flag = true)]
pub struct VoteBotArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Channel for announcements
    #[arg(long, env = "VOTEBOT_MEETING_CHANNEL", default_value = "meeting")]
    pub meeting_channel: String,

    /// Channel where ballots are cast
    #[arg(long, env = "VOTEBOT_VOTE_CHANNEL", default_value = "vote")]
    pub vote_channel: String,

    /// Seconds after the start of a vote to warn that it is ending
    #[arg(long, env = "VOTEBOT_WARN_SECS", default_value_t = 90)]
    pub warn_secs: u64,

    /// Seconds after the start of a vote to close it
    #[arg(long, env = "VOTEBOT_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl VoteBotArgs {
    pub fn bot_config(&self) -> VoteBotConfig {
        VoteBotConfig {
            meeting_channel: self.meeting_channel.clone(),
            vote_channel: self.vote_channel.clone(),
            warn_secs: self.warn_secs,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "vote-auditor",
    about = "Checks a vote bot's published results",
    disable_help_flag = true
)]
pub struct AuditorArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Nick of the vote bot to audit
    #[arg(long, env = "AUDITOR_TARGET_NICK")]
    pub target_nick: String,

    /// Channel the vote bot runs its votes in
    #[arg(long, env = "AUDITOR_VOTE_CHANNEL", default_value = "vote")]
    pub vote_channel: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}
