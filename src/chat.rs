//! Twitch chat over IRC
//!
//! A small IRC client. It logs in, joins one channel and turns `PRIVMSG` lines
//! into [`ChatEvent`]s. One background task owns the socket: it answers `PING`,
//! writes queued outbound lines and re-dials with capped exponential backoff
//! when the server closes the connection or asks for a `RECONNECT`. The inbound
//! receiver survives reconnects.

use crate::config::ChatConfig;
use crate::error::{DispatchError, Result};
use crate::notify::ChatNotifier;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the inbound event and outbound line channels
const CHANNEL_CAPACITY: usize = 256;

/// Upper bound for the re-dial delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// One inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Login name of the sender
    pub speaker: String,
    /// Message text
    pub text: String,
    /// True when the bot itself sent the message
    pub is_self: bool,
}

/// A parsed IRC line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    /// Server keepalive; must be answered with `PONG :<token>`
    Ping(String),
    /// Channel message
    Message(ChatEvent),
    /// Server notice (login failures are reported this way)
    Notice(String),
    /// Server is going away; the client should re-dial
    Reconnect,
    /// Anything else
    Other,
}

/// Parse one raw IRC line (without the trailing CRLF)
pub fn parse_line(line: &str, bot_username: &str) -> IrcLine {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    if let Some(token) = rest.strip_prefix("PING ") {
        return IrcLine::Ping(token.trim_start_matches(':').to_string());
    }

    // IRCv3 tags
    if rest.starts_with('@') {
        match rest.split_once(' ') {
            Some((_, tail)) => rest = tail,
            None => return IrcLine::Other,
        }
    }

    let Some(prefixed) = rest.strip_prefix(':') else {
        return IrcLine::Other;
    };
    let Some((prefix, tail)) = prefixed.split_once(' ') else {
        return IrcLine::Other;
    };
    let (command, params) = tail.split_once(' ').unwrap_or((tail, ""));

    match command {
        "PRIVMSG" => {
            let Some((_target, text)) = params.split_once(" :") else {
                return IrcLine::Other;
            };
            let speaker = prefix.split('!').next().unwrap_or(prefix).to_string();
            let is_self = speaker.eq_ignore_ascii_case(bot_username);
            IrcLine::Message(ChatEvent {
                speaker,
                text: text.to_string(),
                is_self,
            })
        }
        "NOTICE" => {
            let text = params.split_once(" :").map(|(_, t)| t).unwrap_or(params);
            IrcLine::Notice(text.to_string())
        }
        "RECONNECT" => IrcLine::Reconnect,
        _ => IrcLine::Other,
    }
}

/// Format a channel message, flattening line breaks that would end the IRC line
pub fn privmsg(channel: &str, text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("PRIVMSG #{} :{}", channel, flat)
}

/// Connected Twitch chat client; sends messages to the joined channel
#[derive(Clone)]
pub struct TwitchChat {
    outbound: mpsc::Sender<String>,
    channel: String,
}

/// Login details replayed on every (re)connect
struct Session {
    host: String,
    port: u16,
    username: String,
    oauth_token: String,
    channel: String,
    reconnect_delay: Duration,
}

impl Session {
    async fn dial(&self) -> Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| DispatchError::Chat(format!("connect {}:{}: {}", self.host, self.port, e)))
    }

    fn login_lines(&self) -> [String; 3] {
        [
            format!("PASS {}", self.oauth_token),
            format!("NICK {}", self.username),
            format!("JOIN #{}", self.channel),
        ]
    }
}

/// Why a connection ended
enum Disconnect {
    /// Server closed, failed or asked for a reconnect
    Dropped,
    /// Every handle (inbound receiver or all clients) is gone
    Finished,
}

impl TwitchChat {
    /// Connect, log in and join the configured channel.
    ///
    /// Returns the client and a receiver of inbound chat messages. The first
    /// dial must succeed; later drops are re-dialed in the background and the
    /// receiver keeps delivering.
    pub async fn connect(config: &ChatConfig) -> Result<(Self, mpsc::Receiver<ChatEvent>)> {
        if config.channel.is_empty() {
            return Err(DispatchError::Config("chat.channel is required".to_string()));
        }
        let session = Session {
            host: config.host.clone(),
            port: config.port,
            username: config.username.to_lowercase(),
            oauth_token: config.oauth_token.clone(),
            channel: config.channel.trim_start_matches('#').to_lowercase(),
            reconnect_delay: config.reconnect_delay,
        };

        let stream = session.dial().await?;
        info!(host = %session.host, port = session.port, channel = %session.channel, "Connected to chat server");

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<ChatEvent>(CHANNEL_CAPACITY);

        let chat = Self {
            outbound: outbound_tx,
            channel: session.channel.clone(),
        };
        tokio::spawn(maintain(session, stream, outbound_rx, events_tx));
        Ok((chat, events_rx))
    }

    /// Channel this client joined, without `#`
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Drive one connection after another until nobody is listening
async fn maintain(
    session: Session,
    first: TcpStream,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<ChatEvent>,
) {
    let mut stream = Some(first);
    let mut delay = session.reconnect_delay;

    loop {
        let socket = match stream.take() {
            Some(socket) => socket,
            None => match session.dial().await {
                Ok(socket) => {
                    info!(channel = %session.channel, "Reconnected to chat server");
                    socket
                }
                Err(_) if events.is_closed() => return,
                Err(e) => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Chat reconnect failed");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                    continue;
                }
            },
        };
        delay = session.reconnect_delay;

        match run_connection(&session, socket, &mut outbound, &events).await {
            Disconnect::Finished => {
                debug!("Chat client dropped; stopping connection task");
                return;
            }
            Disconnect::Dropped => {
                if events.is_closed() {
                    return;
                }
                warn!(retry_in_ms = delay.as_millis() as u64, "Chat connection lost; re-dialing");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Log in and pump one socket until it ends
async fn run_connection(
    session: &Session,
    socket: TcpStream,
    outbound: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<ChatEvent>,
) -> Disconnect {
    let (read_half, mut write_half) = socket.into_split();

    for line in session.login_lines() {
        if let Err(e) = write_half.write_all(format!("{}\r\n", line).as_bytes()).await {
            warn!(error = %e, "Chat login failed");
            return Disconnect::Dropped;
        }
    }

    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        warn!("Chat connection closed by server");
                        return Disconnect::Dropped;
                    }
                    Err(e) => {
                        warn!(error = %e, "Chat read failed");
                        return Disconnect::Dropped;
                    }
                };
                match parse_line(&line, &session.username) {
                    IrcLine::Ping(token) => {
                        let pong = format!("PONG :{}\r\n", token);
                        if let Err(e) = write_half.write_all(pong.as_bytes()).await {
                            warn!(error = %e, "Chat write failed");
                            return Disconnect::Dropped;
                        }
                    }
                    IrcLine::Message(event) => {
                        if events.send(event).await.is_err() {
                            return Disconnect::Finished;
                        }
                    }
                    IrcLine::Notice(text) => warn!(notice = %text, "Chat server notice"),
                    IrcLine::Reconnect => {
                        info!("Chat server requested reconnect");
                        return Disconnect::Dropped;
                    }
                    IrcLine::Other => debug!(line = %line, "Ignoring chat line"),
                }
            }
            line = outbound.recv() => {
                let Some(line) = line else {
                    return Disconnect::Finished;
                };
                if let Err(e) = write_half.write_all(format!("{}\r\n", line).as_bytes()).await {
                    warn!(error = %e, "Chat write failed");
                    return Disconnect::Dropped;
                }
            }
        }
    }
}

#[async_trait]
impl ChatNotifier for TwitchChat {
    async fn notify(&self, text: &str) -> Result<()> {
        self.outbound
            .send(privmsg(&self.channel, text))
            .await
            .map_err(|_| DispatchError::Notify("chat connection closed".to_string()))
    }
}
