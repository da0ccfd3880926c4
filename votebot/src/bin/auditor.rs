//! vote-auditor: checks the results a vote bot publishes.
//!
//! Sits in the vote channel next to the conductor, replays every ballot on
//! its own tally, and logs `audit successful` or `audit failed` once the
//! conductor has published its results.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use votebot_sdk::{IrcClient, Transcript};

use votebot::auditor::VoteAuditor;
use votebot::config::AuditorArgs;
use votebot::mechanics::VoteMechanics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "votebot=info,votebot_sdk=info".into()),
        )
        .init();

    let args = AuditorArgs::parse();
    let messages = Arc::new(args.connect.catalog()?);
    let connect = args.connect.connect_config("IRC Vote Auditor");

    tracing::info!(server = %connect.server_addr(), nick = %connect.nick, target = %args.target_nick, "Connecting");
    let client = IrcClient::connect(&connect, Transcript::new(&args.connect.transcript_dir))
        .await
        .with_context(|| format!("cannot connect to {}", connect.server_addr()))?;

    let auditor = Arc::new(VoteAuditor::new(
        &args.target_nick,
        &args.vote_channel,
        VoteMechanics::new(messages),
    ));
    client.assign_bot(auditor.clone());
    client.join(auditor.vote_channel())?;
    tracing::info!(nick = client.nick(), channel = auditor.vote_channel(), "Ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
        _ = client.closed() => tracing::warn!("Server closed the connection"),
    }

    if let Some(outcome) = auditor.last_outcome() {
        tracing::info!(?outcome, "Last audit");
    }
    client.shutdown().await;
    Ok(())
}
