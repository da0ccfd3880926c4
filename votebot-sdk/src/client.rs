//! IRC client for the vote bots.
//!
//! Connects over TCP (optionally TLS), registers with `NICK`/`USER` and
//! returns once the server has sent `001`. After that a reader task answers
//! `PING`s, records transcripts and dispatches messages into the bound
//! [`Bot`], while a writer task drains the outbound queue in call order.
//!
//! ## Reconnection
//!
//! There is none. When the reader stops (EOF or I/O error) the session is
//! dead; [`IrcClient::closed`] resolves and the owning process decides what
//! to do.

use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::bot::Bot;
use crate::codec::{LineReader, LineWriter};
use crate::error::ClientError;
use crate::event::{self, Event};
use crate::transcript::Transcript;

/// Default port for TLS connections, also the `--port` default.
pub const DEFAULT_TLS_PORT: u16 = 7000;
/// Conventional port for plaintext connections.
pub const DEFAULT_PLAIN_PORT: u16 = 6667;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server host name (also the TLS server name).
    pub host: String,
    pub port: u16,
    /// Desired nickname, also used as the user name.
    pub nick: String,
    /// Real name sent in `USER`.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_TLS_PORT,
            nick: "votebot".to_string(),
            realname: "IRC Votebot".to_string(),
            tls: true,
        }
    }
}

impl ConnectConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Commands consumed by the writer task.
#[derive(Debug)]
enum Command {
    /// Lines written back to back, so a multi-line message is never
    /// interleaved with another caller's output.
    Lines(Vec<String>),
    /// Write `QUIT` and stop the writer.
    Quit,
}

/// State shared between the client handle and its reader task.
struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    bot: RwLock<Option<Arc<dyn Bot>>>,
    transcript: Transcript,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn send_lines(&self, lines: Vec<String>) -> Result<(), ClientError> {
        self.commands
            .send(Command::Lines(lines))
            .map_err(|_| ClientError::Closed)
    }

    fn send_line(&self, line: String) -> Result<(), ClientError> {
        self.send_lines(vec![line])
    }

    fn bot(&self) -> Result<Arc<dyn Bot>, ClientError> {
        self.bot.read().clone().ok_or(ClientError::NoBotAssigned)
    }

    fn dispatch(&self, event: Event) -> Result<(), ClientError> {
        let bot = self.bot()?;
        match event {
            Event::ChannelMessage { from, channel, text } => {
                bot.public_message(&from, &channel, &text)
            }
            Event::PrivateMessage { from, text, .. } => bot.private_message(&from, &text),
            Event::Joined { nick, channel } => {
                bot.join(&nick, &channel);
                Ok(())
            }
            Event::Parted { nick, channel } => {
                bot.part(&nick, &channel);
                Ok(())
            }
            Event::Ping { .. } | Event::Registered | Event::Other { .. } => Ok(()),
        }
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(
    config: &ConnectConfig,
) -> Result<EstablishedConnection, ClientError> {
    let addr = config.server_addr();
    let mode = if config.tls { "TLS" } else { "plain" };

    tracing::debug!("Connecting to {addr} ({mode})...");
    let tcp = TcpStream::connect(&addr).await?;

    if config.tls {
        let connector = TlsConnector::from(Arc::new(rustls_default_config()));
        let dns_name = rustls::pki_types::ServerName::try_from(config.host.clone())
            .map_err(|_| ClientError::ServerName(config.host.clone()))?;
        let tls_stream = connector.connect(dns_name, tcp).await?;
        tracing::debug!("TLS handshake with {addr} complete");
        Ok(EstablishedConnection::Tls(tls_stream))
    } else {
        Ok(EstablishedConnection::Plain(tcp))
    }
}

fn install_crypto_provider() {
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Check a nickname against `[a-zA-Z0-9_-]+`.
pub fn validate_nick(nick: &str) -> Result<(), ClientError> {
    if NAME_RE.is_match(nick) {
        Ok(())
    } else {
        Err(ClientError::InvalidNick(nick.to_string()))
    }
}

/// Check a channel name (without `#`) against `[a-zA-Z0-9_-]+`.
pub fn validate_channel(channel: &str) -> Result<(), ClientError> {
    if NAME_RE.is_match(channel) {
        Ok(())
    } else {
        Err(ClientError::InvalidChannel(channel.to_string()))
    }
}

/// Split an outbound message into PRIVMSG bodies.
///
/// Splits on LF only. Trailing empty pieces are dropped, and any remaining
/// empty piece becomes a single space so the server never sees an empty
/// PRIVMSG. An empty message still yields one `" "` line.
fn message_lines(message: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = message.split('\n').collect();
    while lines.len() > 1 && lines.last() == Some(&"") {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|line| if line.is_empty() { " " } else { line })
        .collect()
}

/// A registered IRC session.
pub struct IrcClient {
    nick: String,
    shared: Arc<Shared>,
    channels: Mutex<BTreeSet<String>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Receiver<bool>,
}

impl IrcClient {
    /// Connect, register and wait for the server's welcome.
    pub async fn connect(config: &ConnectConfig, transcript: Transcript) -> Result<Self, ClientError> {
        validate_nick(&config.nick)?;
        match establish_connection(config).await? {
            EstablishedConnection::Plain(tcp) => Self::start(tcp, config, transcript).await,
            EstablishedConnection::Tls(tls) => Self::start(tls, config, transcript).await,
        }
    }

    /// Register over an already-open stream.
    pub async fn with_stream<S>(
        stream: S,
        config: &ConnectConfig,
        transcript: Transcript,
    ) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        validate_nick(&config.nick)?;
        Self::start(stream, config, transcript).await
    }

    async fn start<S>(stream: S, config: &ConnectConfig, transcript: Transcript) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let (registered_tx, registered_rx) = oneshot::channel();

        let shared = Arc::new(Shared {
            commands: cmd_tx,
            bot: RwLock::new(None),
            transcript,
            closed: closed_tx,
        });

        let writer_task = tokio::spawn(write_loop(LineWriter::new(writer), cmd_rx));
        tokio::spawn(read_loop(LineReader::new(reader), shared.clone(), registered_tx));

        shared.send_lines(vec![
            format!("NICK {}", config.nick),
            format!("USER {} 0 * :{}", config.nick, config.realname),
        ])?;

        registered_rx
            .await
            .map_err(|_| ClientError::Registration("connection closed before welcome".to_string()))?;
        tracing::info!(nick = %config.nick, "Registered");

        Ok(Self {
            nick: config.nick.clone(),
            shared,
            channels: Mutex::new(BTreeSet::new()),
            writer: Mutex::new(Some(writer_task)),
            closed: closed_rx,
        })
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Install the bot that receives dispatched events.
    pub fn assign_bot(&self, bot: Arc<dyn Bot>) {
        *self.shared.bot.write() = Some(bot);
    }

    fn check_bot(&self) -> Result<(), ClientError> {
        if self.shared.bot.read().is_none() {
            return Err(ClientError::NoBotAssigned);
        }
        Ok(())
    }

    /// Join `#channel`. Joining a channel twice sends one `JOIN`.
    pub fn join(&self, channel: &str) -> Result<(), ClientError> {
        self.check_bot()?;
        validate_channel(channel)?;
        let mut channels = self.channels.lock();
        if channels.insert(channel.to_string()) {
            self.shared.send_line(format!("JOIN #{channel}"))?;
        }
        Ok(())
    }

    /// Leave `#channel`. Leaving a channel we are not in sends nothing.
    pub fn leave(&self, channel: &str) -> Result<(), ClientError> {
        self.check_bot()?;
        validate_channel(channel)?;
        let mut channels = self.channels.lock();
        if channels.remove(channel) {
            self.shared.send_line(format!("PART #{channel}"))?;
        }
        Ok(())
    }

    /// Leave every joined channel. Errors are logged.
    pub fn leave_all(&self) {
        let channels: Vec<String> = self.channels.lock().iter().cloned().collect();
        for channel in channels {
            if let Err(e) = self.leave(&channel) {
                tracing::error!(channel = %channel, error = %e, "Cannot leave channel");
            }
        }
    }

    pub fn joined_channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    /// Send `message` to `#channel`, one PRIVMSG per line.
    pub fn send(&self, message: &str, channel: &str) -> Result<(), ClientError> {
        self.check_bot()?;
        validate_channel(channel)?;
        self.privmsg(&format!("#{channel}"), message)
    }

    /// Send `message` to `nick`, one PRIVMSG per line.
    pub fn send_private(&self, message: &str, nick: &str) -> Result<(), ClientError> {
        self.check_bot()?;
        validate_nick(nick)?;
        self.privmsg(nick, message)
    }

    fn privmsg(&self, target: &str, message: &str) -> Result<(), ClientError> {
        let lines = message_lines(message)
            .into_iter()
            .map(|line| format!("PRIVMSG {target} :{line}"))
            .collect();
        self.shared.send_lines(lines)
    }

    /// Send `QUIT`. The writer stops afterwards.
    pub fn quit(&self) {
        if self.shared.commands.send(Command::Quit).is_err() {
            tracing::debug!("QUIT after writer stopped");
        }
    }

    /// Leave all channels, quit, and wait until the writer has flushed.
    pub async fn shutdown(&self) {
        self.leave_all();
        self.quit();
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                tracing::warn!(error = %e, "Writer task failed");
            }
        }
        self.shared.transcript.close();
    }

    /// Resolves once the reader has stopped.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|done| *done).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn write_loop<W>(mut writer: LineWriter<W>, mut commands: mpsc::UnboundedReceiver<Command>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = commands.recv().await {
        let (lines, last) = match cmd {
            Command::Lines(lines) => (lines, false),
            Command::Quit => (vec!["QUIT".to_string()], true),
        };
        for line in &lines {
            if let Err(e) = writer.write_line(line).await {
                tracing::error!(error = %e, "Write failed, stopping writer");
                return;
            }
        }
        if last {
            break;
        }
    }
}

async fn read_loop<R>(
    mut lines: LineReader<R>,
    shared: Arc<Shared>,
    registered: oneshot::Sender<()>,
) where
    R: AsyncRead + Unpin,
{
    let mut registered = Some(registered);
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Server closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Read failed, stopping reader");
                break;
            }
        };

        let event = match event::parse(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed line");
                continue;
            }
        };

        match event {
            Event::Ping { payload } => {
                tracing::debug!("PONG");
                if shared.send_line(format!("PONG {payload}")).is_err() {
                    break;
                }
            }
            Event::Registered => {
                if let Some(tx) = registered.take() {
                    let _ = tx.send(());
                }
            }
            Event::Other { .. } => match event.numeric() {
                // Errors such as 433 (nick in use) leave registration pending.
                Some(code) if registered.is_some() => {
                    tracing::warn!(code, "Server reply before welcome: {line}")
                }
                _ => tracing::debug!("unknown line: {line}"),
            },
            event => {
                if let Some(key) = event.transcript_key() {
                    shared.transcript.append(&key, &line);
                }
                if let Err(e) = shared.dispatch(event) {
                    tracing::warn!(error = %e, "Dispatch failed: {line}");
                }
            }
        }
    }
    let _ = shared.closed.send(true);
}
