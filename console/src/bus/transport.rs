//! Live connection to the daemon.
//!
//! The socket task owns the only live WebSocket and reports what happens
//! on it as [`TransportEvent`]s over a channel; the bus consumes them in
//! arrival order. Outbound frames go the other way through the
//! [`Transport`] handle. Dropping the handle closes the socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use shared_types::{AuthOkPayload, BusRequest, MSG_AUTH_FAIL, MSG_AUTH_OK};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::BusError;
use crate::context::AppContext;

/// Everything the transport layer reports to the bus
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Closed,
    Frame(String),
    AuthOk {
        token: String,
        name: String,
        license_key: String,
    },
    AuthFail,
}

/// Outbound half of a live connection
pub trait Transport: Send {
    fn send_text(&mut self, text: String) -> Result<(), BusError>;
}

/// How the socket task reconnects after losing the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed wait between attempts
    pub delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt follows `failures` consecutive failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

pub struct WsTransport {
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl WsTransport {
    /// Start connecting in the background; never fails synchronously.
    pub fn connect(
        url: String,
        ctx: Arc<AppContext>,
        policy: RetryPolicy,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(url, ctx, policy, events, outbound_rx));
        Self { outbound, task }
    }
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> Result<(), BusError> {
        self.outbound
            .send(text)
            .map_err(|_| BusError::TransportClosed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionEnd {
    /// Socket dropped; reconnect per policy
    Lost,
    /// Handshake rejected or the bus went away; stop for good
    Finished,
}

async fn run_socket(
    url: String,
    ctx: Arc<AppContext>,
    policy: RetryPolicy,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let mut failures: u32 = 0;
    loop {
        tracing::info!(url = %url, "Connecting to daemon");
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                failures = 0;
                let token = ctx.auth.handshake_token();
                let end = run_session(stream, token, &events, &mut outbound).await;
                if events.send(TransportEvent::Closed).is_err() {
                    return;
                }
                if matches!(end, SessionEnd::Finished) {
                    return;
                }
                tracing::warn!(url = %url, "Connection to daemon lost");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(url = %url, attempt = failures, error = %e, "Failed to connect to daemon");
                if events.send(TransportEvent::Closed).is_err() {
                    return;
                }
                if !policy.should_retry(failures) {
                    tracing::error!(attempts = failures, "Giving up on daemon connection");
                    return;
                }
            }
        }
        tokio::time::sleep(policy.delay).await;
    }
}

async fn run_session<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    token: String,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = stream.split();

    let hello = match serde_json::to_string(&BusRequest::Auth { token }) {
        Ok(hello) => hello,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode handshake");
            return SessionEnd::Finished;
        }
    };
    if let Err(e) = write.send(Message::Text(hello)).await {
        tracing::warn!(error = %e, "Failed to send handshake");
        return SessionEnd::Lost;
    }
    if events.send(TransportEvent::Open).is_err() {
        return SessionEnd::Finished;
    }

    let mut authenticated = false;
    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let event = if authenticated {
                        TransportEvent::Frame(text)
                    } else {
                        classify_handshake_reply(text)
                    };
                    let rejected = matches!(event, TransportEvent::AuthFail);
                    authenticated |= matches!(event, TransportEvent::AuthOk { .. });
                    if events.send(event).is_err() {
                        return SessionEnd::Finished;
                    }
                    if rejected {
                        let _ = write.close().await;
                        return SessionEnd::Finished;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Daemon closed the connection");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket read failed");
                    return SessionEnd::Lost;
                }
                None => return SessionEnd::Lost,
            },
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "WebSocket write failed");
                        return SessionEnd::Lost;
                    }
                }
                None => {
                    let _ = write.close().await;
                    return SessionEnd::Finished;
                }
            },
        }
    }
}

/// Pick out the daemon's reply to the handshake; anything else passes
/// through as an ordinary frame.
fn classify_handshake_reply(text: String) -> TransportEvent {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&text) else {
        return TransportEvent::Frame(text);
    };
    match map.iter().next() {
        Some((kind, payload)) if kind == MSG_AUTH_OK => {
            match serde_json::from_value::<AuthOkPayload>(payload.clone()) {
                Ok(ok) if ok.token.is_empty() => {
                    tracing::warn!("authOk reply carried no token");
                    TransportEvent::AuthFail
                }
                Ok(ok) => TransportEvent::AuthOk {
                    token: ok.token,
                    name: ok.name,
                    license_key: ok.license_key,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed authOk reply");
                    TransportEvent::AuthFail
                }
            }
        }
        Some((kind, _)) if kind == MSG_AUTH_FAIL => TransportEvent::AuthFail,
        _ => TransportEvent::Frame(text),
    }
}
