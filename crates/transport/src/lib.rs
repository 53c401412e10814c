#![deny(unsafe_code)]

mod error;
mod event;
mod http;
mod sse;
mod target;
mod transport;
mod websocket;
mod wire;

pub use error::{ErrorKind, TransportError, TransportResult};
pub use event::{
    StreamEvent, StreamPayload, TransportEvent, TransportEventSink, TransportEventStream,
    event_channel,
};
pub use http::HttpStreamTransport;
pub use sse::SseDecoder;
pub use target::{Generation, StreamSessionId, StreamTarget};
pub use transport::{BoxFuture, ChatTransport, TransportConfig, TransportKind};
pub use websocket::WebSocketTransport;
pub use wire::{ChatCommand, HistoryItem, WireMessage, WireRole};

/// A transport together with the stream its inbound traffic arrives on.
pub struct TransportHandle {
    pub transport: Box<dyn ChatTransport>,
    pub events: TransportEventStream,
}

pub fn create_transport(config: TransportConfig) -> TransportHandle {
    let (sink, events) = event_channel();
    let transport: Box<dyn ChatTransport> = match config.kind {
        TransportKind::WebSocket => Box::new(WebSocketTransport::new(config.websocket_url, sink)),
        TransportKind::Http => Box::new(HttpStreamTransport::new(config.http_base_url, sink)),
    };

    tracing::debug!(transport = %config.kind, "transport created");
    TransportHandle { transport, events }
}
