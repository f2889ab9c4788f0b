//! Telnet client for DX cluster and Reverse Beacon Network feeds.
//!
//! [`SpotSession`] holds the protocol state (login handshake, line
//! assembly, pause) and knows nothing about sockets. [`SpotClient`] drives
//! a session over a tokio `TcpStream` and reports [`ClientEvent`]s on a
//! channel; a [`ClientHandle`] controls the running connection.
//!
//! The client never reconnects by itself. After a disconnect the caller
//! decides whether to call [`SpotClient::start`] again.

use anyhow::{Context, Result};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Default RBN telnet server.
pub const RBN_HOST: &str = "telnet.reversebeacon.net";

/// Default port for CW/RTTY spots.
pub const RBN_PORT_CW: u16 = 7000;

/// Default port for FT8 spots.
pub const RBN_PORT_FT8: u16 = 7001;

/// Buffered bytes without a newline after which the buffer is dropped.
pub const MAX_BUFFERED_BYTES: usize = 64 * 1024;

/// Prompts that trigger the login write, matched case-insensitively.
pub const DEFAULT_LOGIN_PROMPTS: &[&str] = &["call:", "login:"];

/// Connection state of a spot feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    AwaitingLogin,
    Streaming,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Disconnected => write!(f, "disconnected"),
            ClientState::Connecting => write!(f, "connecting"),
            ClientState::AwaitingLogin => write!(f, "awaiting login"),
            ClientState::Streaming => write!(f, "streaming"),
        }
    }
}

/// What a session wants done after consuming a chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionOutput {
    /// Bytes to write to the server (the login token).
    pub write: Option<String>,

    /// Complete, trimmed, non-empty lines ready for parsing.
    pub lines: Vec<String>,
}

/// Protocol state for one feed connection.
#[derive(Debug)]
pub struct SpotSession {
    callsign: String,
    prompts: Vec<String>,
    state: ClientState,
    buffer: Vec<u8>,
    login_sent: bool,
    paused: bool,
}

impl SpotSession {
    /// Create a session that logs in as `callsign` when a prompt appears.
    pub fn new(callsign: impl Into<String>, prompts: &[String]) -> Self {
        Self {
            callsign: callsign.into(),
            prompts: prompts.iter().map(|p| p.to_ascii_lowercase()).collect(),
            state: ClientState::Disconnected,
            buffer: Vec::with_capacity(1024),
            login_sent: false,
            paused: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn login_sent(&self) -> bool {
        self.login_sent
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// A connection attempt has started.
    pub fn connecting(&mut self) {
        self.reset();
        self.state = ClientState::Connecting;
    }

    /// The socket is connected; wait for the server to speak first.
    pub fn connected(&mut self) {
        self.reset();
        self.state = ClientState::AwaitingLogin;
    }

    /// The socket closed or failed. Buffered partial data is discarded.
    pub fn disconnected(&mut self) {
        self.reset();
        self.state = ClientState::Disconnected;
    }

    /// Keep draining the socket but drop everything received.
    pub fn pause(&mut self) {
        self.paused = true;
        if self.state == ClientState::Streaming {
            self.buffer.clear();
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.login_sent = false;
    }

    /// Feed bytes received from the server.
    pub fn receive(&mut self, data: &[u8]) -> SessionOutput {
        let mut out = SessionOutput::default();

        match self.state {
            ClientState::AwaitingLogin => {
                self.buffer.extend_from_slice(data);
                let Some(end) = self.prompt_end() else {
                    self.enforce_limit();
                    return out;
                };
                self.buffer.drain(..end);
                if !self.login_sent {
                    self.login_sent = true;
                    out.write = Some(format!("{}\r\n", self.callsign));
                }
                self.state = ClientState::Streaming;
                if self.paused {
                    self.buffer.clear();
                } else {
                    self.drain_lines(&mut out.lines);
                }
            }
            ClientState::Streaming if self.paused => {
                self.buffer.clear();
            }
            ClientState::Streaming => {
                self.buffer.extend_from_slice(data);
                self.drain_lines(&mut out.lines);
            }
            ClientState::Disconnected | ClientState::Connecting => {
                debug!("Ignoring {} bytes received while {}", data.len(), self.state);
            }
        }

        out
    }

    /// Byte offset just past the first login prompt in the buffer.
    ///
    /// Prompts are matched ASCII case-insensitively on the raw bytes, so
    /// invalid UTF-8 before the prompt cannot shift the offset.
    fn prompt_end(&self) -> Option<usize> {
        self.prompts
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                let needle = p.as_bytes();
                self.buffer
                    .windows(needle.len())
                    .position(|w| w.eq_ignore_ascii_case(needle))
                    .map(|pos| pos + needle.len())
            })
            .min()
    }

    fn drain_lines(&mut self, lines: &mut Vec<String>) {
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let raw = &self.buffer[start..start + offset];
            let line = String::from_utf8_lossy(raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start += offset + 1;
        }
        self.buffer.drain(..start);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        if self.buffer.len() > MAX_BUFFERED_BYTES {
            warn!(
                "Discarding {} buffered bytes without a line break",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }
}

/// Configuration for the spot feed client.
#[derive(Debug, Clone)]
pub struct SpotClientConfig {
    /// Hostname of the cluster server.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Callsign to use for login.
    pub callsign: String,

    /// Server texts that trigger the login write.
    pub login_prompts: Vec<String>,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Maximum silence before the connection is considered dead.
    pub read_timeout: Option<Duration>,
}

impl Default for SpotClientConfig {
    fn default() -> Self {
        Self {
            host: RBN_HOST.to_string(),
            port: RBN_PORT_CW,
            callsign: "N0CALL".to_string(),
            login_prompts: DEFAULT_LOGIN_PROMPTS.iter().map(|p| p.to_string()).collect(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
        }
    }
}

impl SpotClientConfig {
    /// Create a new configuration with the given callsign.
    pub fn with_callsign(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            ..Default::default()
        }
    }

    /// Set the host and port.
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }
}

/// Events from the spot client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection changed state.
    State(ClientState),

    /// A complete line was received while streaming.
    Line(String),

    /// The connection failed; a `State(Disconnected)` follows.
    Error(String),
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    Stop,
}

/// Controls a running connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ClientState>,
}

impl ClientHandle {
    /// Drop received lines until [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    /// Close the socket and discard any partial line.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Wait until the connection reports `Disconnected`.
    pub async fn closed(&mut self) {
        let _ = self
            .state
            .wait_for(|s| *s == ClientState::Disconnected)
            .await;
    }
}

/// Async spot feed client.
pub struct SpotClient {
    config: SpotClientConfig,
}

impl SpotClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SpotClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpotClientConfig {
        &self.config
    }

    /// Connect and stream lines in a background task.
    ///
    /// Returns a handle for pause/resume/stop and a receiver of events.
    /// The task ends when the connection closes; events end with
    /// `State(Disconnected)`.
    pub fn start(&self) -> (ClientHandle, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(1000);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Connecting);

        let config = self.config.clone();
        tokio::spawn(async move {
            let mut session = SpotSession::new(&config.callsign, &config.login_prompts);
            let mut conn = Connection {
                config: &config,
                tx: &tx,
                state: &state_tx,
                last: None,
            };
            session.connecting();
            conn.report(&session).await;

            if let Err(e) = conn.run(&mut session, control_rx).await {
                error!("Connection error: {:#}", e);
                let _ = tx.send(ClientEvent::Error(format!("{:#}", e))).await;
            }

            session.disconnected();
            conn.report(&session).await;
        });

        (
            ClientHandle {
                control: control_tx,
                state: state_rx,
            },
            rx,
        )
    }
}

/// One connection attempt, reporting to the event channel.
struct Connection<'a> {
    config: &'a SpotClientConfig,
    tx: &'a mpsc::Sender<ClientEvent>,
    state: &'a watch::Sender<ClientState>,
    last: Option<ClientState>,
}

impl Connection<'_> {
    /// Publish the session state if it changed.
    async fn report(&mut self, session: &SpotSession) {
        let state = session.state();
        if self.last == Some(state) {
            return;
        }
        self.last = Some(state);
        self.state.send_replace(state);
        let _ = self.tx.send(ClientEvent::State(state)).await;
    }

    /// Connect and stream until the server closes, an error, or `stop`.
    async fn run(
        &mut self,
        session: &mut SpotSession,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Connecting to {}...", addr);

        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        info!("Connected to {}", addr);
        session.connected();
        self.report(session).await;

        let read_timeout = self.config.read_timeout;
        let mut chunk = vec![0u8; 4096];
        loop {
            tokio::select! {
                command = control.recv() => match command {
                    Some(Control::Pause) => {
                        info!("Spot feed paused");
                        session.pause();
                    }
                    Some(Control::Resume) => {
                        info!("Spot feed resumed");
                        session.resume();
                    }
                    Some(Control::Stop) | None => {
                        info!("Stopping spot feed");
                        let _ = stream.shutdown().await;
                        return Ok(());
                    }
                },

                result = read_chunk(&mut stream, &mut chunk, read_timeout) => {
                    let n = result?;
                    if n == 0 {
                        info!("Connection closed by server");
                        return Ok(());
                    }

                    let out = session.receive(&chunk[..n]);
                    if let Some(login) = out.write {
                        info!("Sending callsign: {}", login.trim_end());
                        stream
                            .write_all(login.as_bytes())
                            .await
                            .context("Failed to send callsign")?;
                        stream.flush().await?;
                    }
                    self.report(session).await;

                    for line in out.lines {
                        debug!("Received: {}", line);
                        if self.tx.send(ClientEvent::Line(line)).await.is_err() {
                            // Receiver dropped
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Read one chunk, optionally bounded by a timeout.
async fn read_chunk(
    stream: &mut TcpStream,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> Result<usize> {
    match limit {
        Some(limit) => {
            let n = timeout(limit, stream.read(buf))
                .await
                .context("Read timeout")?
                .context("Read error")?;
            Ok(n)
        }
        None => stream.read(buf).await.context("Read error"),
    }
}
