//! TelemetryBus - the console's single live link to the daemon
//!
//! # Architecture
//!
//! - One [`Transport`] handle at a time; attaching a new one replaces the old
//! - Transport callbacks arrive as [`TransportEvent`]s and are applied by
//!   [`TelemetryBus::handle_event`], in the order the socket received them
//! - Inbound frames are single-key wrappers (`{"kind": payload}`) and are
//!   dispatched through a [`MessageRouter`]
//! - Outbound requests are flat `{"msg": kind, ...}` objects
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bus = TelemetryBus::new(ctx.clone(), router);
//! let mut events = bus.connect("http://127.0.0.1:9123/", RetryPolicy::default())?;
//! while let Some(event) = events.recv().await {
//!     bus.handle_event(event);
//! }
//! ```

pub mod router;
pub mod transport;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use shared_types::{AuthOkPayload, BusRequest, MSG_AUTH_OK};
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::context::{AppContext, View};
pub use router::{MessageHandler, MessageRouter, RoutedMessage};
pub use transport::{RetryPolicy, Transport, TransportEvent, WsTransport};

/// Frames buffered while disconnected; the oldest is dropped beyond this.
pub const MAX_QUEUED_FRAMES: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("not connected to the daemon")]
    NotConnected,
    #[error("transport task has shut down")]
    TransportClosed,
    #[error("malformed inbound frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported page scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Outcome of a request submitted through a request builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// Derive the daemon's WebSocket URL from the dashboard page URL.
///
/// `https` maps to `wss` and `http` to `ws`; host, port and path are kept,
/// fragment and query are dropped and `ws` is appended to the path.
pub fn transport_url(page_url: &str) -> Result<Url, BusError> {
    let mut url = Url::parse(page_url)?;
    url.set_fragment(None);
    url.set_query(None);

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(BusError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| BusError::UnsupportedScheme(scheme.to_string()))?;

    let path = if url.path().ends_with('/') {
        format!("{}ws", url.path())
    } else {
        format!("{}/ws", url.path())
    };
    url.set_path(&path);
    Ok(url)
}

/// Characters whose escapes stay encoded when an identifier is decoded
const RESERVED: &[u8] = b"#$&+,/:;=?@";

/// Percent-decode an identifier taken from a link before it goes on the wire.
///
/// Escapes of reserved URI characters (`%2F`, `%3F`, ...) are kept as-is.
/// An identifier that does not decode to valid UTF-8 is passed through
/// unchanged.
fn decode_id(id: &str) -> String {
    decode_unreserved(id).unwrap_or_else(|_| id.to_string())
}

fn decode_unreserved(id: &str) -> Result<String, std::string::FromUtf8Error> {
    let bytes = id.as_bytes();
    let mut decoded = String::with_capacity(id.len());
    let mut run_start = 0;
    let mut i = 0;
    while i + 2 < bytes.len() {
        let reserved = bytes[i] == b'%'
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
            && u8::from_str_radix(&id[i + 1..i + 3], 16)
                .is_ok_and(|byte| RESERVED.contains(&byte));
        if reserved {
            decoded.push_str(&urlencoding::decode(&id[run_start..i])?);
            decoded.push_str(&id[i..i + 3]);
            i += 3;
            run_start = i;
        } else {
            i += 1;
        }
    }
    decoded.push_str(&urlencoding::decode(&id[run_start..])?);
    Ok(decoded)
}

pub struct TelemetryBus {
    ctx: Arc<AppContext>,
    router: MessageRouter,
    transport: Option<Box<dyn Transport>>,
    connected: watch::Sender<bool>,
    queue: VecDeque<String>,
}

impl TelemetryBus {
    pub fn new(ctx: Arc<AppContext>, router: MessageRouter) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            ctx,
            router,
            transport: None,
            connected,
            queue: VecDeque::new(),
        }
    }

    /// Spawn a WebSocket transport for `page_url` and attach it.
    ///
    /// Returns the event stream the caller must feed back into
    /// [`handle_event`](Self::handle_event).
    pub fn connect(
        &mut self,
        page_url: &str,
        policy: RetryPolicy,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, BusError> {
        let url = transport_url(page_url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = WsTransport::connect(url.to_string(), self.ctx.clone(), policy, events_tx);
        self.attach(Box::new(transport));
        Ok(events_rx)
    }

    /// Install a transport, dropping any previous one.
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        if self.transport.replace(transport).is_some() {
            tracing::debug!("Replacing existing transport");
        }
        self.set_connected(false);
    }

    pub fn detach(&mut self) {
        self.transport = None;
        self.set_connected(false);
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Connectivity signal for status indicators
    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    // ========================================================================
    // Transport callbacks
    // ========================================================================

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Closed => self.on_close(),
            TransportEvent::Frame(raw) => {
                if let Err(e) = self.on_message(&raw) {
                    tracing::warn!(error = %e, bytes = raw.len(), "Dropping inbound frame");
                }
            }
            TransportEvent::AuthOk {
                token,
                name,
                license_key,
            } => self.on_auth_ok(&token, &name, &license_key),
            TransportEvent::AuthFail => self.on_auth_fail(),
        }
    }

    pub fn on_open(&mut self) {
        tracing::info!("Connected to daemon");
        self.set_connected(true);
        match self.flush_queue() {
            Ok(0) => {}
            Ok(flushed) => tracing::debug!(flushed, "Flushed queued requests"),
            Err(e) => tracing::warn!(error = %e, "Failed to flush queued requests"),
        }
    }

    pub fn on_close(&mut self) {
        if self.is_connected() {
            tracing::warn!("Disconnected from daemon");
        }
        self.set_connected(false);
    }

    /// Parse one inbound frame and route it by its first key.
    pub fn on_message(&mut self, raw: &str) -> Result<usize, BusError> {
        let frame: serde_json::Value =
            serde_json::from_str(raw).map_err(BusError::MalformedFrame)?;
        let message = RoutedMessage::from_frame(frame);
        Ok(self.router.route(&message))
    }

    pub fn on_auth_ok(&mut self, token: &str, name: &str, license_key: &str) {
        if token.is_empty() {
            tracing::warn!("authOk carried no token");
            self.on_auth_fail();
            return;
        }
        if let Err(e) = self.ctx.auth.on_auth_ok(token, name, license_key) {
            tracing::warn!(error = %e, "Failed to persist auth token");
        }

        let login = AuthOkPayload {
            token: token.to_string(),
            name: name.to_string(),
            license_key: license_key.to_string(),
        };
        match serde_json::to_value(&login) {
            Ok(payload) => {
                self.router.route(&RoutedMessage::new(MSG_AUTH_OK, payload));
            }
            Err(e) => tracing::warn!(error = %e, "Failed to publish authOk"),
        }
    }

    pub fn on_auth_fail(&mut self) {
        if let Err(e) = self.ctx.auth.on_auth_fail() {
            tracing::warn!(error = %e, "Failed to evict persisted auth token");
        }
        self.ctx.navigate(View::Login);
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    pub fn current_token(&self) -> String {
        self.ctx.auth.current_token()
    }

    /// Serialize and write one message. Fails with `NotConnected` before
    /// the transport reports open.
    pub fn send<M: Serialize>(&mut self, message: &M) -> Result<(), BusError> {
        let text = serde_json::to_string(message).map_err(BusError::Encode)?;
        self.send_text(text)
    }

    fn send_text(&mut self, text: String) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(BusError::NotConnected)?;
        transport.send_text(text)
    }

    /// Buffer a message for [`flush_queue`](Self::flush_queue).
    pub fn queue<M: Serialize>(&mut self, message: &M) -> Result<(), BusError> {
        let text = serde_json::to_string(message).map_err(BusError::Encode)?;
        if self.queue.len() >= MAX_QUEUED_FRAMES {
            self.queue.pop_front();
            tracing::warn!(limit = MAX_QUEUED_FRAMES, "Outbound queue full; dropping oldest request");
        }
        self.queue.push_back(text);
        Ok(())
    }

    /// Deliver everything queued while disconnected, oldest first.
    pub fn flush_queue(&mut self) -> Result<usize, BusError> {
        let mut flushed = 0;
        while let Some(text) = self.queue.pop_front() {
            if let Err(e) = self.send_text(text.clone()) {
                self.queue.push_front(text);
                return Err(e);
            }
            flushed += 1;
        }
        Ok(flushed)
    }

    /// Send now if connected, otherwise queue for the next open.
    pub fn submit(&mut self, request: &BusRequest) -> Result<Delivery, BusError> {
        if self.is_connected() {
            self.send(request)?;
            return Ok(Delivery::Sent);
        }
        tracing::debug!(kind = request.kind(), "Not connected; queueing request");
        self.queue(request)?;
        Ok(Delivery::Queued)
    }

    // ========================================================================
    // Request builders
    // ========================================================================

    pub fn request_throughput_chart_circuit(&mut self, circuit_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::ThroughputChartCircuit {
            period: self.ctx.graph_period(),
            circuit_id: decode_id(circuit_id),
        })
    }

    pub fn request_throughput_chart_site(&mut self, site_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::ThroughputChartSite {
            period: self.ctx.graph_period(),
            site_id: decode_id(site_id),
        })
    }

    pub fn request_rtt_chart_site(&mut self, site_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::RttChartSite {
            period: self.ctx.graph_period(),
            site_id: decode_id(site_id),
        })
    }

    pub fn request_rtt_chart_circuit(&mut self, circuit_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::RttChartCircuit {
            period: self.ctx.graph_period(),
            circuit_id: decode_id(circuit_id),
        })
    }

    pub fn request_site_heat(&mut self, site_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::SiteHeat {
            period: self.ctx.graph_period(),
            site_id: decode_id(site_id),
        })
    }

    pub fn send_search(&mut self, term: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::Search {
            term: term.to_string(),
        })
    }

    pub fn request_site_info(&mut self, site_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::SiteInfo {
            site_id: decode_id(site_id),
        })
    }

    pub fn request_circuit_info(&mut self, circuit_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::CircuitInfo {
            circuit_id: decode_id(circuit_id),
        })
    }

    pub fn request_site_parents(&mut self, site_id: &str) -> Result<Delivery, BusError> {
        self.submit(&BusRequest::SiteParents {
            site_id: decode_id(site_id),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
