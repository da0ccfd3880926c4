//! In-memory IRC server for driving the bots end to end.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

use votebot_sdk::codec::LineReader;
use votebot_sdk::{ConnectConfig, IrcClient, Transcript};

pub const TIMEOUT: Duration = Duration::from_secs(2);

pub struct Server {
    lines: LineReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Server {
    pub async fn expect(&mut self, expected: &str) {
        let line = timeout(TIMEOUT, self.lines.next_line())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
            .unwrap()
            .unwrap_or_else(|| panic!("client closed before {expected:?}"));
        assert_eq!(line, expected);
    }

    pub async fn expect_all(&mut self, expected: &[&str]) {
        for line in expected {
            self.expect(line).await;
        }
    }

    pub async fn inject(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }

    /// Channel message from `nick`.
    pub async fn say(&mut self, nick: &str, channel: &str, text: &str) {
        self.inject(&format!(":{nick}!{nick}@test.host PRIVMSG #{channel} :{text}")).await;
    }

    /// Private message from `nick` to `target`.
    pub async fn tell(&mut self, nick: &str, target: &str, text: &str) {
        self.inject(&format!(":{nick}!{nick}@test.host PRIVMSG {target} :{text}")).await;
    }

    /// Waits until every earlier line has been handled and asserts the
    /// client wrote nothing in between.
    pub async fn sync(&mut self, marker: &str) {
        self.inject(&format!("PING {marker}")).await;
        self.expect(&format!("PONG {marker}")).await;
    }
}

pub async fn connected(nick: &str) -> (Arc<IrcClient>, Server) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (reader, mut writer) = tokio::io::split(server_io);
    writer
        .write_all(format!(":irc.test 001 {nick} :Welcome to the test network\r\n").as_bytes())
        .await
        .unwrap();

    let config = ConnectConfig {
        host: "irc.test".to_string(),
        port: 6667,
        nick: nick.to_string(),
        realname: "Test".to_string(),
        tls: false,
    };
    let client = timeout(TIMEOUT, IrcClient::with_stream(client_io, &config, Transcript::disabled()))
        .await
        .expect("registration timed out")
        .unwrap();

    let mut server = Server {
        lines: LineReader::new(reader),
        writer,
    };
    server.expect(&format!("NICK {nick}")).await;
    server.expect(&format!("USER {nick} 0 * :Test")).await;
    (Arc::new(client), server)
}
