//! IRC client.
//!
//! This is the main entry point for SDK consumers. It manages the TCP
//! connection, IRC registration and CAP negotiation, and emits events.
//! Supports both plaintext and TLS connections.
//!
//! ## Latency
//!
//! Every client PING carries a unique token. When the matching PONG comes
//! back the round trip is stored on the [`ClientHandle`], so consumers can
//! report server latency without issuing their own pings.
//!
//! ## Reconnection
//!
//! [`connect`] does not reconnect. Use [`run_with_reconnect`] for a loop
//! with exponential backoff that rejoins channels after each registration.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::Event;
use crate::irc::{self, Message};

/// Capabilities requested when the server offers them.
const WANTED_CAPS: &[&str] = &[
    "message-tags",
    "server-time",
    "echo-message",
    "away-notify",
    "multi-prefix",
];

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "harper".to_string(),
            user: "harper".to_string(),
            realname: "H.A.R.P.E.R.".to_string(),
            tls: false,
            tls_insecure: false,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Part(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
    /// Last measured PING round trip in microseconds; 0 until the first PONG.
    latency_us: Arc<AtomicU64>,
}

impl ClientHandle {
    /// Build a handle over an existing command channel.
    ///
    /// Nothing reads the other end unless the caller does, which lets a bot
    /// be driven without a live server.
    pub fn from_sender(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self {
            cmd_tx,
            latency_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Last measured server round trip, if any PONG has been seen yet.
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_us.load(Ordering::Relaxed) {
            0 => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.send(Command::Join(channel.to_string())).await
    }

    pub async fn part(&self, channel: &str) -> Result<()> {
        self.send(Command::Part(channel.to_string())).await
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.send(Command::Quit(message.map(|s| s.to_string()))).await
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.send(Command::Raw(line.to_string())).await
    }

    /// Send a message with IRCv3 tags.
    pub async fn send_tagged(
        &self,
        target: &str,
        text: &str,
        tags: std::collections::HashMap<String, String>,
    ) -> Result<()> {
        let mut msg = Message::new("PRIVMSG", vec![target.to_string(), text.to_string()]);
        msg.tags = tags;
        self.raw(&msg.to_string()).await
    }

    /// Send a TAGMSG (tags-only, no body) to a target.
    pub async fn send_tagmsg(
        &self,
        target: &str,
        tags: std::collections::HashMap<String, String>,
    ) -> Result<()> {
        let mut msg = Message::new("TAGMSG", vec![target.to_string()]);
        msg.tags = tags;
        self.raw(&msg.to_string()).await
    }

    /// Send a reaction emoji to a specific message.
    pub async fn react(&self, target: &str, emoji: &str, msgid: &str) -> Result<()> {
        let mut tags = std::collections::HashMap::new();
        tags.insert("+draft/react".to_string(), emoji.to_string());
        tags.insert("+draft/reply".to_string(), msgid.to_string());
        self.send_tagmsg(target, tags).await
    }

    /// Send a typing indicator start.
    pub async fn typing_start(&self, target: &str) -> Result<()> {
        let mut tags = std::collections::HashMap::new();
        tags.insert("+typing".to_string(), "active".to_string());
        self.send_tagmsg(target, tags).await
    }

    /// Send a typing indicator stop.
    pub async fn typing_stop(&self, target: &str) -> Result<()> {
        let mut tags = std::collections::HashMap::new();
        tags.insert("+typing".to_string(), "done".to_string());
        self.send_tagmsg(target, tags).await
    }

    /// Set (or with `None`, clear) our AWAY message.
    pub async fn away(&self, message: Option<&str>) -> Result<()> {
        let msg = match message {
            Some(m) => Message::new("AWAY", vec![m.to_string()]),
            None => Message::new("AWAY", Vec::new()),
        };
        self.raw(&msg.to_string()).await
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("IRC connection task has stopped"))
    }
}

/// Establish TCP (and optionally TLS) connection to the server.
///
/// Connection errors surface here, before any protocol task is spawned.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    // Auto-detect TLS from port if not explicitly set
    let use_tls = config.tls || config.server_addr.ends_with(":6697");
    let mode = if use_tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .with_context(|| format!("TCP connect to {} failed", config.server_addr))?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if !use_tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if config.tls_insecure {
        tracing::debug!("TLS: insecure mode (skipping cert verification)");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = config
        .server_addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(&config.server_addr);
    let dns_name = rustls::pki_types::ServerName::try_from(server_name.to_string())?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", config.server_addr))?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Connect using an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The IRC protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let handle = ClientHandle::from_sender(cmd_tx);
    let latency = handle.latency_us.clone();

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = drive(conn, &config, latency, event_tx.clone(), cmd_rx).await;
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

/// Connect to an IRC server and run the client.
///
/// Returns a handle for sending commands and a receiver for events.
/// Connection failures are reported as [`Event::Disconnected`].
pub fn connect(config: ConnectConfig) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let handle = ClientHandle::from_sender(cmd_tx);
    let latency = handle.latency_us.clone();

    tokio::spawn(async move {
        let result: Result<()> = async {
            let conn = establish_connection(&config).await?;
            let _ = event_tx.send(Event::Connected).await;
            drive(conn, &config, latency, event_tx.clone(), cmd_rx).await
        }
        .await;
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

async fn drive(
    conn: EstablishedConnection,
    config: &ConnectConfig,
    latency: Arc<AtomicU64>,
    event_tx: mpsc::Sender<Event>,
    cmd_rx: mpsc::Receiver<Command>,
) -> Result<()> {
    match conn {
        EstablishedConnection::Plain(tcp) => {
            let (reader, writer) = tokio::io::split(tcp);
            run_irc(BufReader::new(reader), writer, config, latency, event_tx, cmd_rx).await
        }
        EstablishedConnection::Tls(tls) => {
            let (reader, writer) = tokio::io::split(*tls);
            run_irc(BufReader::new(reader), writer, config, latency, event_tx, cmd_rx).await
        }
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

/// Outstanding client PING awaiting its PONG.
struct PendingPing {
    token: String,
    sent_at: tokio::time::Instant,
}

async fn send_ping<W: AsyncWrite + Unpin>(
    writer: &mut W,
    counter: &mut u64,
    pending: &mut Option<PendingPing>,
) -> Result<()> {
    *counter += 1;
    let token = format!("harper-{counter}");
    writer
        .write_all(format!("PING :{token}\r\n").as_bytes())
        .await?;
    *pending = Some(PendingPing {
        token,
        sent_at: tokio::time::Instant::now(),
    });
    Ok(())
}

async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    latency: Arc<AtomicU64>,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(b"CAP LS 302\r\n").await?;
    writer
        .write_all(format!("NICK {}\r\n", config.nick).as_bytes())
        .await?;
    writer
        .write_all(format!("USER {} 0 * :{}\r\n", config.user, config.realname).as_bytes())
        .await?;

    let mut registered = false;
    let mut nick_tries: u32 = 0;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut pending_ping: Option<PendingPing> = None;
    let mut ping_counter: u64 = 0;
    let mut line_buf = String::new();
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = Duration::from_secs(60);
    let ping_timeout = Duration::from_secs(120);

    loop {
        tokio::select! {
            result = reader.read_line(&mut line_buf) => {
                let n = result?;
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                }

                last_activity = tokio::time::Instant::now();
                let raw = line_buf.trim_end().to_string();
                let _ = event_tx.send(Event::RawLine(raw)).await;

                if let Some(msg) = Message::parse(&line_buf) {
                    match msg.command.as_str() {
                        // ERR_NICKNAMEINUSE
                        "433" if !registered => {
                            nick_tries = nick_tries.saturating_add(1);
                            if nick_tries <= 5 {
                                let alt = format!("{}{}", config.nick, nick_tries);
                                tracing::debug!(nick = %alt, "Nick in use, retrying");
                                writer.write_all(format!("NICK {alt}\r\n").as_bytes()).await?;
                            } else {
                                let _ = event_tx.send(Event::Disconnected { reason: "Nick in use".to_string() }).await;
                                break;
                            }
                        }
                        "CAP" => handle_cap_response(&msg, &mut writer).await?,
                        "001" => {
                            let nick = msg.params.first().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::Registered { nick }).await;
                            registered = true;
                            for cmd in pending_commands.drain(..) {
                                execute_command(&mut writer, cmd).await?;
                            }
                            send_ping(&mut writer, &mut ping_counter, &mut pending_ping).await?;
                        }
                        "PING" => {
                            let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                            writer.write_all(format!("PONG :{token}\r\n").as_bytes()).await?;
                        }
                        "PONG" => {
                            let token = msg.params.last().map(|s| s.as_str()).unwrap_or("");
                            if let Some(ping) = pending_ping.take_if(|p| p.token == token) {
                                let rtt = ping.sent_at.elapsed().as_micros().max(1) as u64;
                                latency.store(rtt, Ordering::Relaxed);
                                tracing::trace!(rtt_us = rtt, "PONG received");
                            }
                        }
                        "353" => {
                            if msg.params.len() >= 4 {
                                let channel = msg.params[2].clone();
                                let nicks = msg.params[3].split_whitespace().map(|s| s.to_string()).collect();
                                let _ = event_tx.send(Event::Names { channel, nicks }).await;
                            }
                        }
                        "JOIN" => {
                            let channel = msg.params.first().cloned().unwrap_or_default();
                            let nick = msg.source_nick().unwrap_or("").to_string();
                            let _ = event_tx.send(Event::Joined { channel, nick }).await;
                        }
                        "PART" => {
                            let channel = msg.params.first().cloned().unwrap_or_default();
                            let nick = msg.source_nick().unwrap_or("").to_string();
                            let _ = event_tx.send(Event::Parted { channel, nick }).await;
                        }
                        "NICK" => {
                            let old_nick = msg.source_nick().unwrap_or("").to_string();
                            let new_nick = msg.params.first().cloned().unwrap_or_default();
                            if !old_nick.is_empty() && !new_nick.is_empty() {
                                let _ = event_tx.send(Event::NickChanged { old_nick, new_nick }).await;
                            }
                        }
                        "MODE" => {
                            if msg.params.len() >= 2 && irc::is_channel(&msg.params[0]) {
                                let _ = event_tx.send(Event::ModeChanged {
                                    channel: msg.params[0].clone(),
                                    mode: msg.params[1].clone(),
                                    arg: msg.params.get(2).cloned(),
                                    set_by: msg.source_nick().unwrap_or("server").to_string(),
                                }).await;
                            }
                        }
                        "KICK" => {
                            if msg.params.len() >= 2 {
                                let _ = event_tx.send(Event::Kicked {
                                    channel: msg.params[0].clone(),
                                    nick: msg.params[1].clone(),
                                    by: msg.source_nick().unwrap_or("server").to_string(),
                                    reason: msg.params.get(2).cloned().unwrap_or_default(),
                                }).await;
                            }
                        }
                        "INVITE" => {
                            if msg.params.len() >= 2 {
                                let _ = event_tx.send(Event::Invited {
                                    channel: msg.params[1].clone(),
                                    by: msg.source_nick().unwrap_or("someone").to_string(),
                                }).await;
                            }
                        }
                        "QUIT" => {
                            let nick = msg.source_nick().unwrap_or("").to_string();
                            let reason = msg.params.first().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::UserQuit { nick, reason }).await;
                        }
                        "PRIVMSG" | "NOTICE" => {
                            if msg.params.len() >= 2 {
                                let prefix = msg.prefix.as_deref().unwrap_or("");
                                if msg.command == "NOTICE" && !prefix.contains('!') {
                                    // Server NOTICE (no hostmask in prefix)
                                    let text = msg.params[1].clone();
                                    let _ = event_tx.send(Event::ServerNotice { text }).await;
                                } else {
                                    let _ = event_tx.send(Event::Message {
                                        from: irc::nick_of(prefix).to_string(),
                                        target: msg.params[0].clone(),
                                        text: msg.params[1].clone(),
                                        tags: msg.tags.clone(),
                                    }).await;
                                }
                            }
                        }
                        "FAIL" => {
                            let text = msg.params.join(" ");
                            let _ = event_tx.send(Event::ServerNotice { text }).await;
                        }
                        _ => {
                            // Surface error numerics so the consumer can log them.
                            if let Ok(num) = msg.command.parse::<u16>()
                                && (400..600).contains(&num)
                            {
                                let text = if msg.params.len() > 1 {
                                    msg.params[1..].join(" ")
                                } else {
                                    msg.params.join(" ")
                                };
                                let _ = event_tx.send(Event::ServerNotice { text }).await;
                            }
                        }
                    }
                }

                line_buf.clear();
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    // Every handle dropped; nobody can talk to us any more.
                    writer.write_all(b"QUIT\r\n").await?;
                    break;
                };
                let quitting = matches!(cmd, Command::Quit(_));
                if registered || quitting {
                    execute_command(&mut writer, cmd).await?;
                    if quitting {
                        writer.flush().await?;
                    }
                    if !registered {
                        break;
                    }
                } else {
                    // Queue until registered; JOINs before 001 are dropped by servers.
                    pending_commands.push(cmd);
                }
            }
            // Periodic client-to-server PING and timeout detection
            _ = tokio::time::sleep_until(last_activity + ping_interval) => {
                if last_activity.elapsed() > ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                send_ping(&mut writer, &mut ping_counter, &mut pending_ping).await?;
            }
        }
    }

    Ok(())
}

/// Execute a single IRC command on the wire.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    let line = match cmd {
        Command::Join(channel) => format!("JOIN {channel}"),
        Command::Part(channel) => format!("PART {channel}"),
        Command::Privmsg { target, text } => format!("PRIVMSG {target} :{text}"),
        Command::Notice { target, text } => format!("NOTICE {target} :{text}"),
        Command::Raw(line) => line,
        Command::Quit(Some(m)) => format!("QUIT :{m}"),
        Command::Quit(None) => "QUIT".to_string(),
    };
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

async fn handle_cap_response<W: AsyncWrite + Unpin>(msg: &Message, writer: &mut W) -> Result<()> {
    let subcmd = msg.params.get(1).map(|s| s.to_ascii_uppercase());
    match subcmd.as_deref() {
        Some("LS") => {
            let offered: Vec<&str> = msg
                .params
                .last()
                .map(|s| s.split_whitespace().collect())
                .unwrap_or_default();
            let req_caps: Vec<&str> = WANTED_CAPS
                .iter()
                .copied()
                .filter(|cap| {
                    offered
                        .iter()
                        .any(|o| o.split('=').next() == Some(*cap))
                })
                .collect();
            if req_caps.is_empty() {
                writer.write_all(b"CAP END\r\n").await?;
            } else {
                let req = format!("CAP REQ :{}\r\n", req_caps.join(" "));
                writer.write_all(req.as_bytes()).await?;
            }
        }
        Some("ACK") | Some("NAK") => {
            writer.write_all(b"CAP END\r\n").await?;
        }
        _ => {}
    }
    Ok(())
}

// ── Reconnect helper ──

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Channels to rejoin after reconnecting.
    pub channels: Vec<String>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            channels: Vec::new(),
        }
    }
}

impl ReconnectConfig {
    /// Delay to use after `delay`, including up to 25% jitter, capped at `max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        let base = delay.as_millis() as f64 * self.backoff_factor;
        let jitter_max = (delay.as_millis() as u64 / 4).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_max);
        Duration::from_millis((base as u64 + jitter).min(self.max_delay.as_millis() as u64))
    }
}

/// What the event handler wants the reconnect loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Run an event loop with automatic reconnection.
///
/// The `handler` is called for each event. When disconnected, the loop
/// reconnects with exponential backoff and rejoins configured channels.
/// Handler errors are logged and do not stop the loop; returning
/// [`Flow::Stop`] does.
pub async fn run_with_reconnect<F>(
    config: ConnectConfig,
    reconnect_config: ReconnectConfig,
    handler: F,
) -> Result<()>
where
    F: Fn(
            ClientHandle,
            Event,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Flow>> + Send>>
        + Send
        + Sync,
{
    let mut delay = reconnect_config.initial_delay;
    let mut consecutive_failures = 0u32;

    loop {
        let conn = match establish_connection(&config).await {
            Ok(c) => {
                consecutive_failures = 0;
                delay = reconnect_config.initial_delay;
                c
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    error = %e,
                    attempt = consecutive_failures,
                    delay_secs = delay.as_secs(),
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = reconnect_config.next_delay(delay);
                continue;
            }
        };

        let (handle, mut events) = connect_with_stream(conn, config.clone());

        while let Some(event) = events.recv().await {
            if matches!(&event, Event::Registered { .. }) {
                for ch in &reconnect_config.channels {
                    let _ = handle.join(ch).await;
                }
            }
            let disconnected = matches!(&event, Event::Disconnected { .. });
            match handler(handle.clone(), event).await {
                Ok(Flow::Stop) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => tracing::error!(error = %e, "Handler error"),
            }
            if disconnected {
                break;
            }
        }

        tracing::info!(delay_secs = delay.as_secs(), "Disconnected, will reconnect");
        tokio::time::sleep(delay).await;
        delay = reconnect_config.next_delay(delay);
    }
}
