//! votebot: conducts timed votes in an IRC channel.
//!
//! Send the bot a private message to drive it:
//!
//!   vote <topic>   Start a vote
//!   cancel         Finish the running vote early
//!   help           List commands
//!
//! Ballots (aye, naye, abstain, or `proxy <nick> <value>`) go to the vote
//! channel; announcements go to both the meeting and the vote channel.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use votebot_sdk::{IrcClient, Transcript};

use votebot::conductor::VoteBot;
use votebot::config::VoteBotArgs;
use votebot::mechanics::VoteMechanics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "votebot=info,votebot_sdk=info".into()),
        )
        .init();

    let args = VoteBotArgs::parse();
    let messages = Arc::new(args.connect.catalog()?);
    let connect = args.connect.connect_config("IRC Votebot");

    tracing::info!(server = %connect.server_addr(), nick = %connect.nick, tls = connect.tls, "Connecting");
    let client = IrcClient::connect(&connect, Transcript::new(&args.connect.transcript_dir))
        .await
        .with_context(|| format!("cannot connect to {}", connect.server_addr()))?;
    let client = Arc::new(client);

    let mechanics = Arc::new(VoteMechanics::new(messages.clone()));
    let bot = Arc::new(VoteBot::new(args.bot_config(), mechanics, client.clone(), messages));
    client.assign_bot(bot.clone());
    bot.join_channels()?;
    tracing::info!(
        nick = client.nick(),
        meeting = %bot.config().meeting_channel,
        vote = %bot.config().vote_channel,
        "Ready"
    );

    let timer = tokio::spawn(bot.clone().run_timer());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        _ = client.closed() => tracing::warn!("Server closed the connection"),
    }

    timer.abort();
    client.shutdown().await;
    Ok(())
}
