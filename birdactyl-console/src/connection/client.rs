//! WebSocket client for the per-server console channel

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use birdactyl_protocol::{
    decode_server_frame, encode_client_frame, ClientFrame, ServerFrame, ServerId, API_PREFIX,
};
use birdactyl_utils::{ConsoleError, Result};

use super::backoff::{Backoff, ReconnectPolicy};
use super::handler::Disconnect;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outgoing queue depth
const OUTGOING_CAPACITY: usize = 100;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Waiting between reconnect attempts
    Reconnecting,
    /// Rejected or out of retries; terminal until a new session
    Errored,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Errored => "error",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Something the background task observed
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Socket is open; `reconnected` is set after a gap
    Opened { reconnected: bool },
    Frame(ServerFrame),
    /// Refused by the panel; no retry follows
    Rejected(String),
    /// Socket failed or dropped; a retry or `GaveUp` follows
    Lost(String),
    Reconnecting { attempt: u32, delay: Duration },
    GaveUp { attempts: u32 },
    Closed,
}

/// Parameters for [`Connection::open`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Panel base URL (http, https, ws or wss)
    pub panel_url: Url,
    pub server_id: ServerId,
    pub token: String,
    pub reconnect: ReconnectPolicy,
}

/// Build `{ws_base}/api/v1/servers/{id}/logs?token=...` from the panel URL
pub fn socket_url(panel_url: &Url, server_id: &ServerId, token: &str) -> Result<Url> {
    let scheme = match panel_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConsoleError::config(format!(
                "unsupported panel URL scheme '{}'",
                other
            )))
        }
    };

    let mut url = panel_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| ConsoleError::config(format!("cannot use '{}' as a socket URL", panel_url)))?;
    let base = panel_url.path().trim_end_matches('/');
    url.set_path(&format!("{}{}/servers/{}/logs", base, API_PREFIX, server_id));
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

/// Console channel to one server
pub struct Connection {
    state: ConnectionState,
    /// Reason shown while `Errored`
    error: Option<String>,
    tx: mpsc::Sender<ClientFrame>,
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    cancel: CancellationToken,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Connection {
    /// Start connecting in the background
    ///
    /// Must be called from within a tokio runtime. Progress is reported
    /// through [`Connection::recv`].
    pub fn open(options: ConnectOptions) -> Result<Self> {
        let url = socket_url(&options.panel_url, &options.server_id, &options.token)?;
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracing::info!(server_id = %options.server_id, "Opening console channel");
        let handle = tokio::spawn(connection_task(
            url,
            options.reconnect,
            outgoing_rx,
            events_tx,
            cancel.clone(),
        ));

        Ok(Self {
            state: ConnectionState::Connecting,
            error: None,
            tx: outgoing_tx,
            rx: events_rx,
            cancel,
            task_handle: Some(handle),
        })
    }

    /// Connection driven by hand-fed channels instead of a socket
    #[cfg(test)]
    pub(crate) fn from_parts(
        tx: mpsc::Sender<ClientFrame>,
        rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self {
            state: ConnectionState::Connecting,
            error: None,
            tx,
            rx,
            cancel: CancellationToken::new(),
            task_handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Human-readable reason while `Errored`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Queue a frame for the socket
    pub async fn send(&self, frame: ClientFrame) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(ConsoleError::NotConnected);
        }

        self.tx
            .send(frame)
            .await
            .map_err(|_| ConsoleError::ConnectionClosed)?;

        Ok(())
    }

    /// Next event from the background task, applying its state change
    ///
    /// Returns `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        let event = self.rx.recv().await?;
        self.apply(&event);
        Some(event)
    }

    /// Non-blocking variant of [`Connection::recv`]
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        let event = self.rx.try_recv().ok()?;
        self.apply(&event);
        Some(event)
    }

    /// Stop the background task and close the socket; idempotent
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.cancel.cancel();
        self.task_handle.take();
        self.state = ConnectionState::Closed;
        tracing::debug!("Console channel closed");
    }

    fn apply(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { .. } => {
                self.state = ConnectionState::Open;
                self.error = None;
            }
            ConnectionEvent::Frame(_) => {}
            ConnectionEvent::Rejected(reason) => {
                self.state = ConnectionState::Errored;
                self.error = Some(reason.clone());
            }
            ConnectionEvent::Lost(_) | ConnectionEvent::Reconnecting { .. } => {
                self.state = ConnectionState::Reconnecting;
            }
            ConnectionEvent::GaveUp { attempts } => {
                self.state = ConnectionState::Errored;
                self.error = Some(format!("gave up after {} attempts", attempts));
            }
            ConnectionEvent::Closed => {
                self.state = ConnectionState::Closed;
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How one socket session ended
enum SocketExit {
    Cancelled,
    Ended(Disconnect),
    /// The owning `Connection` is gone
    Orphaned,
}

/// Background task: connect, pump frames, reconnect on loss
async fn connection_task(
    url: Url,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::Receiver<ClientFrame>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(policy);
    let mut reconnected = false;

    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        let disconnect = match attempt {
            Ok((ws, _response)) => {
                backoff.reset();
                // Commands queued for the previous socket are stale.
                while outgoing.try_recv().is_ok() {}
                tracing::info!(reconnected, "Console channel open");
                if events.send(ConnectionEvent::Opened { reconnected }).is_err() {
                    return;
                }
                reconnected = true;
                match run_socket(ws, &mut outgoing, &events, &cancel).await {
                    SocketExit::Cancelled => break,
                    SocketExit::Orphaned => return,
                    SocketExit::Ended(disconnect) => disconnect,
                }
            }
            Err(e) => Disconnect::from_error(&e),
        };

        match disconnect {
            Disconnect::Rejected(reason) => {
                tracing::warn!(%reason, "Console channel rejected");
                let _ = events.send(ConnectionEvent::Rejected(reason));
                return;
            }
            Disconnect::Lost(reason) => {
                tracing::warn!(%reason, "Console channel lost");
                if events.send(ConnectionEvent::Lost(reason)).is_err() {
                    return;
                }
            }
        }

        let Some(delay) = backoff.next_delay() else {
            let attempts = backoff.attempt();
            tracing::error!(attempts, "Giving up on console channel");
            let _ = events.send(ConnectionEvent::GaveUp { attempts });
            return;
        };
        let attempt = backoff.attempt();
        tracing::debug!(attempt, ?delay, "Reconnecting console channel");
        if events
            .send(ConnectionEvent::Reconnecting { attempt, delay })
            .is_err()
        {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let _ = events.send(ConnectionEvent::Closed);
}

/// Pump one open socket until it ends
async fn run_socket(
    ws: WsStream,
    outgoing: &mut mpsc::Receiver<ClientFrame>,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
    cancel: &CancellationToken,
) -> SocketExit {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return SocketExit::Cancelled;
            }

            Some(frame) = outgoing.recv() => {
                let text = match encode_client_frame(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    return SocketExit::Ended(Disconnect::from_error(&e));
                }
            }

            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        return SocketExit::Ended(Disconnect::from_close(frame.as_ref()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SocketExit::Ended(Disconnect::from_error(&e)),
                    None => {
                        return SocketExit::Ended(Disconnect::Lost("stream ended".to_string()));
                    }
                };

                let frame = match decode_server_frame(&text) {
                    Ok(frame) => frame,
                    Err(e) if e.is_forward_compatible() => {
                        tracing::trace!(error = %e, "Skipping console frame");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Dropping malformed console frame");
                        continue;
                    }
                };
                tracing::trace!(kind = frame.kind(), "Console frame");

                if let ServerFrame::Error { message } = &frame {
                    let reason = message.clone();
                    // Deliver the message itself before the rejection.
                    let _ = events.send(ConnectionEvent::Frame(frame));
                    let _ = sink.close().await;
                    return SocketExit::Ended(Disconnect::Rejected(reason));
                }
                if events.send(ConnectionEvent::Frame(frame)).is_err() {
                    return SocketExit::Orphaned;
                }
            }
        }
    }
}
