use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::target::StreamTarget;
use crate::wire::{HistoryItem, WireMessage};

/// Transport-agnostic payload of one streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPayload {
    Chunk(String),
    End,
    Failed { kind: ErrorKind, message: String },
}

impl StreamPayload {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub target: StreamTarget,
    pub payload: StreamPayload,
}

/// Everything a transport can report back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Stream(StreamEvent),
    HistoryList(Vec<HistoryItem>),
    ConversationLoaded {
        id: String,
        messages: Vec<WireMessage>,
    },
    Saved,
    /// Explicit error frame that is not tied to an in-flight response.
    ServerError(String),
    /// The connection dropped without the session asking for it.
    Disconnected { reason: Option<String> },
}

impl TransportEvent {
    pub fn stream(target: StreamTarget, payload: StreamPayload) -> Self {
        Self::Stream(StreamEvent { target, payload })
    }
}

/// Producer half held by transports and their background tasks.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEventSink {
    /// Returns false once the consumer is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Ordered stream of transport events, consumed by the session owner.
#[derive(Debug)]
pub struct TransportEventStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportEventStream {
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

pub fn event_channel() -> (TransportEventSink, TransportEventStream) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (
        TransportEventSink { events: events_tx },
        TransportEventStream { events: events_rx },
    )
}
