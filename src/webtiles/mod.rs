//! # Webtiles Transport Module
//!
//! WebSocket link to a DCSS webtiles server.
//!
//! ## Features
//!
//! - **Login exchange**: `login` (optionally `register`) then `go_lobby`, with
//!   the advertised game ids extracted from the lobby links
//! - **Receive loop**: one task per connection inflates binary frames, splits
//!   batches and feeds every message, in order, into the shared session
//! - **Writer loop**: one task owns the socket sink; keystroke batches, ping
//!   replies and the heartbeat all go through a single `select!` so they never
//!   interleave
//! - **Teardown**: flushes queued output, sends a close frame and drops the
//!   event channel so any waiter observes a lost connection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crawlgate::config::ServerConfig;
//! use crawlgate::game::SessionState;
//! use crawlgate::webtiles::Transport;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = SessionState::shared(200);
//!     let conn = Transport::connect(&ServerConfig::default(), session).await?;
//!     println!("games: {:?}", conn.game_ids);
//!     conn.transport.shutdown(Duration::from_millis(500)).await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod protocol;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::{InboundEvent, SessionFeed, SharedSession};
use crate::logutil::{hex_preview, truncate_for_log};
use crate::metrics;
use codec::FrameDecoder;
use protocol::{ClientMessage, KeyInput, ProtocolMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const WIRE_PREVIEW: usize = 300;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Work for the writer task.
#[derive(Debug)]
pub enum Outbound {
    Message(ClientMessage),
    /// Sent back to back; nothing else is written in between.
    Keys(Vec<KeyInput>),
}

#[derive(Debug)]
enum WriterControl {
    Pong,
    Shutdown(oneshot::Sender<()>),
}

/// Shared liveness flag, cleared by the receive loop when the socket dies.
#[derive(Debug, Clone)]
pub struct LinkStatus(Arc<AtomicBool>);

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStatus {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn mark_lost(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A logged-in connection plus the receiving end of its event stream.
pub struct Connection {
    pub transport: Transport,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
    /// Everything received during login and lobby, already applied.
    pub initial: Vec<ProtocolMessage>,
    pub game_ids: Vec<String>,
}

pub struct Transport {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Outbound>,
    control: mpsc::UnboundedSender<WriterControl>,
    link: LinkStatus,
    session: SharedSession,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Transport {
    /// Open the socket, start both loops and log in.
    pub async fn connect(config: &ServerConfig, session: SharedSession) -> Result<Connection, TransportError> {
        let id = Uuid::new_v4();
        info!("[{}] Connecting to {}", id, config.url);
        let connect_err = |reason: String| TransportError::Connect {
            url: config.url.clone(),
            reason,
        };
        let (socket, _response) = match timeout(config.connect_timeout(), connect_async(config.url.as_str())).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(connect_err(e.to_string())),
            Err(_) => {
                return Err(connect_err(format!(
                    "handshake timed out after {}ms",
                    config.connect_timeout_ms
                )))
            }
        };
        info!("[{}] WebSocket established", id);

        let (sink, stream) = socket.split();
        let (feed, events) = SessionFeed::new(session.clone());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let link = LinkStatus::new();

        let reader = tokio::spawn(read_loop(
            id,
            stream,
            FrameDecoder::new(config.compression_enabled),
            feed,
            control_tx.clone(),
            link.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            id,
            sink,
            outbound_rx,
            control_rx,
            config.heartbeat_interval(),
        ));

        let transport = Transport {
            id,
            outbound: outbound_tx,
            control: control_tx,
            link,
            session,
            reader,
            writer,
        };
        let mut conn = Connection {
            transport,
            events,
            initial: Vec::new(),
            game_ids: Vec::new(),
        };
        if let Err(e) = conn.authenticate(config).await {
            warn!("[{}] Login failed: {}", id, e);
            conn.transport.shutdown(Duration::from_millis(200)).await;
            return Err(e);
        }
        Ok(conn)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn link(&self) -> LinkStatus {
        self.link.clone()
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Sender the dispatcher uses to queue output for the writer task.
    pub fn outbound(&self) -> mpsc::UnboundedSender<Outbound> {
        self.outbound.clone()
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| TransportError::ConnectionLost("writer task stopped".to_string()))
    }

    /// Flush queued output, send a close frame and stop both loops. Waiters
    /// on the event channel then see it close.
    pub async fn shutdown(self, grace: Duration) {
        info!("[{}] Shutting down connection", self.id);
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(WriterControl::Shutdown(ack_tx)).is_ok() {
            if timeout(grace, ack_rx).await.is_err() {
                warn!("[{}] Writer did not flush within {:?}", self.id, grace);
            }
        }
        self.link.mark_lost();
        self.writer.abort();
        self.reader.abort();
    }
}

impl Connection {
    async fn authenticate(&mut self, config: &ServerConfig) -> Result<(), TransportError> {
        let deadline = || Instant::now() + config.connect_timeout();
        self.transport.send(ClientMessage::Login {
            username: config.username.clone(),
            password: config.password.clone(),
        })?;
        let mut auth = self.wait_auth(deadline()).await?;
        if !auth.success && config.register_if_missing {
            info!(
                "[{}] Login refused ({}); trying to register {}",
                self.transport.id,
                auth.reason.as_deref().unwrap_or("no reason"),
                config.username
            );
            self.transport.send(ClientMessage::Register {
                username: config.username.clone(),
                password: config.password.clone(),
                email: String::new(),
            })?;
            auth = self.wait_auth(deadline()).await?;
        }
        if !auth.success {
            return Err(TransportError::Auth(
                auth.reason.unwrap_or_else(|| "login refused".to_string()),
            ));
        }
        info!("[{}] Logged in as {}", self.transport.id, config.username);

        self.transport.send(ClientMessage::GoLobby)?;
        match self
            .wait_for(deadline(), "lobby", |m| matches!(m, ProtocolMessage::Lobby { .. }))
            .await
        {
            Ok(_) => {}
            Err(TransportError::Timeout(what)) => warn!("[{}] No {} reply; continuing", self.transport.id, what),
            Err(e) => return Err(e),
        }
        self.game_ids = self.transport.session.read().await.game_ids.clone();
        info!("[{}] Lobby offers {} game(s): {:?}", self.transport.id, self.game_ids.len(), self.game_ids);
        Ok(())
    }

    async fn wait_auth(&mut self, deadline: Instant) -> Result<protocol::AuthResponse, TransportError> {
        match self
            .wait_for(deadline, "login reply", |m| matches!(m, ProtocolMessage::AuthResponse(_)))
            .await?
        {
            ProtocolMessage::AuthResponse(auth) => Ok(auth),
            _ => Err(TransportError::Auth("unexpected login reply".to_string())),
        }
    }

    /// Consume events until `pred` matches, recording everything seen.
    async fn wait_for<F>(&mut self, deadline: Instant, what: &'static str, pred: F) -> Result<ProtocolMessage, TransportError>
    where
        F: Fn(&ProtocolMessage) -> bool,
    {
        loop {
            match timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(TransportError::Timeout(what)),
                Ok(None) => return Err(TransportError::ConnectionLost("event channel closed".to_string())),
                Ok(Some(InboundEvent::Disconnected { reason })) => return Err(TransportError::ConnectionLost(reason)),
                Ok(Some(InboundEvent::Message { message, .. })) => {
                    self.initial.push(message.clone());
                    if pred(&message) {
                        return Ok(message);
                    }
                }
            }
        }
    }
}

async fn read_loop(
    id: Uuid,
    mut stream: SplitStream<WsStream>,
    mut decoder: FrameDecoder,
    feed: SessionFeed,
    control: mpsc::UnboundedSender<WriterControl>,
    link: LinkStatus,
) {
    let reason = loop {
        let Some(frame) = stream.next().await else {
            break "stream ended".to_string();
        };
        let decoded = match frame {
            Ok(Message::Text(text)) => {
                metrics::inc_frames_received();
                trace!(target: "crawlgate::wire", "[{}] <- text {}", id, truncate_for_log(&text, WIRE_PREVIEW));
                decoder.push_text(&text)
            }
            Ok(Message::Binary(data)) => {
                metrics::inc_frames_received();
                trace!(target: "crawlgate::wire", "[{}] <- binary {}", id, hex_preview(&data, 32));
                decoder.push_binary(&data)
            }
            Ok(Message::Close(frame)) => {
                break match frame {
                    Some(f) if !f.reason.is_empty() => format!("server closed the socket: {}", f.reason),
                    _ => "server closed the socket".to_string(),
                };
            }
            // Protocol-level ping/pong is answered by tungstenite.
            Ok(_) => continue,
            Err(e) => break format!("websocket error: {}", e),
        };
        let values = match decoded {
            Ok(values) => values,
            Err(e) => {
                warn!("[{}] Dropping frame: {}", id, e);
                continue;
            }
        };
        for value in values {
            let message = match protocol::decode(value) {
                Ok(message) => message,
                Err(e) => {
                    metrics::inc_decode_errors();
                    warn!("[{}] Skipping message: {}", id, e);
                    continue;
                }
            };
            metrics::inc_messages_decoded();
            match &message {
                ProtocolMessage::Unrecognized { kind, .. } => {
                    metrics::inc_messages_unrecognized();
                    debug!("[{}] Ignoring unrecognized message kind '{}'", id, kind);
                    continue;
                }
                ProtocolMessage::Ping => {
                    let _ = control.send(WriterControl::Pong);
                }
                other => debug!("[{}] <- {}", id, other.kind()),
            }
            feed.push(message).await;
        }
    };
    info!("[{}] Receive loop finished: {}", id, reason);
    link.mark_lost();
    feed.disconnected(reason);
}

async fn write_loop(
    id: Uuid,
    mut sink: WsSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut control: mpsc::UnboundedReceiver<WriterControl>,
    heartbeat: Duration,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            Some(ctrl) = control.recv() => match ctrl {
                WriterControl::Pong => {
                    if send_message(id, &mut sink, &ClientMessage::Pong).await.is_err() {
                        break;
                    }
                }
                WriterControl::Shutdown(ack) => {
                    while let Ok(pending) = outbound.try_recv() {
                        if send_outbound(id, &mut sink, pending).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    let _ = ack.send(());
                    debug!("[{}] Writer closed the socket", id);
                    return;
                }
            },
            pending = outbound.recv() => match pending {
                Some(pending) => {
                    if send_outbound(id, &mut sink, pending).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if send_message(id, &mut sink, &ClientMessage::Pong).await.is_err() {
                    break;
                }
                metrics::inc_heartbeats_sent();
            }
        }
    }
    debug!("[{}] Writer loop finished", id);
}

async fn send_outbound(id: Uuid, sink: &mut WsSink, pending: Outbound) -> Result<(), WsError> {
    match pending {
        Outbound::Message(message) => send_message(id, sink, &message).await,
        Outbound::Keys(keys) => {
            for key in keys {
                send_message(id, sink, &key.to_message()).await?;
            }
            Ok(())
        }
    }
}

async fn send_message(id: Uuid, sink: &mut WsSink, message: &ClientMessage) -> Result<(), WsError> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("[{}] Failed to serialize outbound message: {}", id, e);
            return Ok(());
        }
    };
    match message {
        ClientMessage::Login { .. } | ClientMessage::Register { .. } => {
            trace!(target: "crawlgate::wire", "[{}] -> credentials", id)
        }
        _ => trace!(target: "crawlgate::wire", "[{}] -> {}", id, json),
    }
    sink.send(Message::Text(json)).await.map_err(|e| {
        warn!("[{}] Send failed: {}", id, e);
        e
    })
}
