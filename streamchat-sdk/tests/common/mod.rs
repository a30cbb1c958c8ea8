//! Scripted chat server driving the far end of an in-memory stream.

#![allow(dead_code)]

use streamchat_sdk::Credentials;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

pub const NICK: &str = "mybot";
pub const CHANNEL: &str = "#chan";

/// Route SDK logs through the test harness; `RUST_LOG=streamchat_sdk=trace`
/// shows the wire traffic of a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn credentials() -> Credentials {
    Credentials::new("MyBot", "secret", "chan").unwrap()
}

pub struct FakeServer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    pub fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Next line from the client without its terminator; `None` on EOF.
    pub async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn accept_auth(&mut self) {
        self.expect("PASS oauth:secret").await;
        self.expect(&format!("NICK {NICK}")).await;
        self.send(&format!(":tmi.twitch.tv 001 {NICK} :Welcome, GLHF!"))
            .await;
    }

    /// Full happy-path handshake.
    pub async fn accept_login(&mut self) {
        self.accept_auth().await;
        self.expect(&format!("JOIN {CHANNEL}")).await;
        self.send(&format!(":{NICK}!{NICK}@{NICK}.tmi.twitch.tv JOIN {CHANNEL}"))
            .await;
    }

    /// Everything the client still sends, until it hangs up.
    pub async fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.recv().await {
            lines.push(line);
        }
        lines
    }
}
