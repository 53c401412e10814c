use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransportResult;
use crate::wire::ChatCommand;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent bidirectional channel with `{type, payload}` envelopes.
    #[default]
    WebSocket,
    /// One streaming HTTP request per message plus REST history calls.
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "http" | "sse" => Ok(Self::Http),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// `ws://host:port/ws`, used by the WebSocket variant.
    pub websocket_url: String,
    /// `http://host:port`, used by the HTTP variant.
    pub http_base_url: String,
}

impl TransportConfig {
    pub fn new(
        kind: TransportKind,
        websocket_url: impl Into<String>,
        http_base_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            websocket_url: websocket_url.into().trim().to_string(),
            http_base_url: http_base_url
                .into()
                .trim()
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

/// Capability set shared by every transport variant.
///
/// Inbound traffic is not returned from these calls; it arrives on the
/// [`TransportEventStream`](crate::TransportEventStream) created together with
/// the transport, in arrival order.
pub trait ChatTransport: Send {
    fn kind(&self) -> TransportKind;
    fn is_connected(&self) -> bool;
    fn connect<'a>(&'a mut self) -> BoxFuture<'a, TransportResult<()>>;
    /// Idempotent. Aborts background work owned by the transport.
    fn disconnect<'a>(&'a mut self) -> BoxFuture<'a, ()>;
    fn send<'a>(&'a mut self, command: ChatCommand) -> BoxFuture<'a, TransportResult<()>>;
}
