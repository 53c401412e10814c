use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use snafu::{ResultExt, ensure};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{
    EncodeCommandSnafu, ErrorKind, NotConnectedSnafu, TransportResult, WebSocketConnectSnafu,
    WebSocketSendSnafu,
};
use crate::event::{StreamPayload, TransportEvent, TransportEventSink};
use crate::target::StreamTarget;
use crate::transport::{BoxFuture, ChatTransport, TransportKind};
use crate::wire::{ChatCommand, CommandEnvelope, InboundEnvelope};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Targets of sent chat commands whose responses have not ended, oldest first.
///
/// The server answers commands in order without echoing a routing key, so
/// stream frames belong to the front entry. A terminal frame pops it.
type Route = Arc<Mutex<VecDeque<StreamTarget>>>;

struct Connection {
    writer: SplitSink<Socket, Message>,
    reader: JoinHandle<()>,
    route: Route,
}

pub struct WebSocketTransport {
    url: String,
    events: TransportEventSink,
    connection: Option<Connection>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, events: TransportEventSink) -> Self {
        Self {
            url: url.into(),
            events,
            connection: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&mut self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        // A reader that already finished leaves a dead writer behind.
        self.close().await;

        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .context(WebSocketConnectSnafu {
                stage: "websocket-connect",
                url: self.url.clone(),
            })?;
        let (writer, reader) = socket.split();
        let route: Route = Arc::new(Mutex::new(VecDeque::new()));
        let reader = tokio::spawn(run_reader(reader, route.clone(), self.events.clone()));

        self.connection = Some(Connection {
            writer,
            reader,
            route,
        });
        tracing::info!(url = %self.url, "websocket connected");
        Ok(())
    }

    async fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        connection.reader.abort();
        if let Err(error) = connection.writer.send(Message::Close(None)).await {
            tracing::debug!(error = %error, "close frame was not delivered");
        }
        let _ = connection.writer.close().await;
        tracing::info!(url = %self.url, "websocket disconnected");
    }

    async fn transmit(&mut self, command: ChatCommand) -> TransportResult<()> {
        ensure!(
            self.is_connected(),
            NotConnectedSnafu {
                stage: "websocket-send",
                transport: "websocket",
            }
        );
        let Some(connection) = self.connection.as_mut() else {
            return NotConnectedSnafu {
                stage: "websocket-send-connection",
                transport: "websocket",
            }
            .fail();
        };

        let frame = serde_json::to_string(&CommandEnvelope::from(&command)).context(
            EncodeCommandSnafu {
                stage: "encode-websocket-command",
                command: command.name(),
            },
        )?;

        // Route before sending so the first chunk can never beat the assignment.
        let is_chat = matches!(command, ChatCommand::Chat { .. });
        if let ChatCommand::Chat { target, .. } = &command {
            connection.route.lock().await.push_back(*target);
        }

        let sent = connection
            .writer
            .send(Message::Text(frame))
            .await
            .context(WebSocketSendSnafu {
                stage: "websocket-send-frame",
            });

        if sent.is_err() && is_chat {
            connection.route.lock().await.pop_back();
        }
        sent?;

        tracing::debug!(command = command.name(), "websocket command sent");
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader.abort();
        }
    }
}

impl ChatTransport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| !connection.reader.is_finished())
    }

    fn connect<'a>(&'a mut self) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.open())
    }

    fn disconnect<'a>(&'a mut self) -> BoxFuture<'a, ()> {
        Box::pin(self.close())
    }

    fn send<'a>(&'a mut self, command: ChatCommand) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.transmit(command))
    }
}

async fn run_reader(mut reader: SplitStream<Socket>, route: Route, events: TransportEventSink) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => {
                if !dispatch_frame(&text, &route, &events).await {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|frame| frame.reason.to_string())
                    .filter(|reason| !reason.is_empty());
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                tracing::warn!(error = %error, "websocket read failed");
                break Some(error.to_string());
            }
            None => break None,
        }
    };

    events.emit(TransportEvent::Disconnected { reason });
}

/// Maps one text frame to a transport event. Returns false once nobody listens.
async fn dispatch_frame(text: &str, route: &Route, events: &TransportEventSink) -> bool {
    let envelope = match serde_json::from_str::<InboundEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(error = %error, frame = %text, "dropping undecodable websocket frame");
            return true;
        }
    };

    let event = match envelope {
        InboundEnvelope::ChatChunk { content } => {
            match route_stream(route, StreamPayload::Chunk(content)).await {
                Some(event) => event,
                None => {
                    tracing::debug!("dropping chat chunk with no chat in flight");
                    return true;
                }
            }
        }
        InboundEnvelope::ChatEnd => match route_stream(route, StreamPayload::End).await {
            Some(event) => event,
            None => {
                tracing::debug!("dropping chat end with no chat in flight");
                return true;
            }
        },
        InboundEnvelope::Error { message } => {
            let failure = StreamPayload::Failed {
                kind: ErrorKind::ProtocolError,
                message: message.clone(),
            };
            route_stream(route, failure)
                .await
                .unwrap_or(TransportEvent::ServerError(message))
        }
        InboundEnvelope::HistoryList { history } => TransportEvent::HistoryList(history),
        InboundEnvelope::ChatHistory { id, messages } => {
            TransportEvent::ConversationLoaded { id, messages }
        }
        InboundEnvelope::SaveSuccess { message } => {
            tracing::debug!(detail = ?message, "server confirmed save");
            TransportEvent::Saved
        }
        InboundEnvelope::Unknown => {
            tracing::warn!(frame = %text, "ignoring websocket frame with unrecognized type");
            return true;
        }
    };

    events.emit(event)
}

/// Tags a stream payload with the oldest open chat. Terminal payloads close it.
async fn route_stream(route: &Route, payload: StreamPayload) -> Option<TransportEvent> {
    let mut open = route.lock().await;
    let target = if payload.is_terminal() {
        open.pop_front()
    } else {
        open.front().copied()
    }?;
    Some(TransportEvent::stream(target, payload))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::event::{TransportEventStream, event_channel};
    use crate::target::{Generation, StreamSessionId};
    use crate::wire::{HistoryItem, WireMessage, WireRole};

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> ServerSocket {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_text(socket: &mut ServerSocket) -> serde_json::Value {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    async fn reply(socket: &mut ServerSocket, frame: serde_json::Value) {
        socket.send(Message::Text(frame.to_string())).await.unwrap();
    }

    async fn next_event(events: &mut TransportEventStream) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open")
    }

    fn target(session: u64) -> StreamTarget {
        StreamTarget::new(Generation::new(1), StreamSessionId::new(session))
    }

    #[tokio::test]
    async fn chunks_arrive_in_order_tagged_with_the_chat_target() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut socket = accept(&listener).await;
            let command = next_text(&mut socket).await;
            assert_eq!(
                command,
                serde_json::json!({"type": "chat", "payload": {"message": "Hello"}})
            );
            for chunk in ["Hi", " there", "!"] {
                reply(
                    &mut socket,
                    serde_json::json!({"type": "chat_chunk", "content": chunk}),
                )
                .await;
            }
            reply(&mut socket, serde_json::json!({"type": "chat_end"})).await;
            // A stray end marker must not produce a second terminal event.
            reply(&mut socket, serde_json::json!({"type": "chat_end"})).await;
            reply(&mut socket, serde_json::json!({"type": "save_success"})).await;
            socket
        });

        let (sink, mut events) = event_channel();
        let mut transport = WebSocketTransport::new(url, sink);
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        transport
            .send(ChatCommand::Chat {
                target: target(3),
                message: "Hello".to_string(),
            })
            .await
            .unwrap();

        for expected in ["Hi", " there", "!"] {
            assert_eq!(
                next_event(&mut events).await,
                TransportEvent::stream(target(3), StreamPayload::Chunk(expected.to_string()))
            );
        }
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::stream(target(3), StreamPayload::End)
        );
        assert_eq!(next_event(&mut events).await, TransportEvent::Saved);

        let _socket = server.await.unwrap();
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn queued_chats_are_answered_in_send_order() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut socket = accept(&listener).await;
            let _first = next_text(&mut socket).await;
            let _second = next_text(&mut socket).await;
            for content in ["old", "new"] {
                reply(
                    &mut socket,
                    serde_json::json!({"type": "chat_chunk", "content": content}),
                )
                .await;
                reply(&mut socket, serde_json::json!({"type": "chat_end"})).await;
            }
            socket
        });

        let (sink, mut events) = event_channel();
        let mut transport = WebSocketTransport::new(url, sink);
        transport.connect().await.unwrap();
        for (session, message) in [(1, "first"), (2, "second")] {
            transport
                .send(ChatCommand::Chat {
                    target: target(session),
                    message: message.to_string(),
                })
                .await
                .unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(next_event(&mut events).await);
        }
        assert_eq!(
            received,
            vec![
                TransportEvent::stream(target(1), StreamPayload::Chunk("old".to_string())),
                TransportEvent::stream(target(1), StreamPayload::End),
                TransportEvent::stream(target(2), StreamPayload::Chunk("new".to_string())),
                TransportEvent::stream(target(2), StreamPayload::End),
            ]
        );

        let _socket = server.await.unwrap();
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn error_frame_terminates_the_in_flight_chat_and_unknown_frames_are_dropped() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut socket = accept(&listener).await;
            let _chat = next_text(&mut socket).await;
            reply(
                &mut socket,
                serde_json::json!({"type": "chat_chunk", "content": "partial"}),
            )
            .await;
            reply(
                &mut socket,
                serde_json::json!({"type": "error", "message": "boom"}),
            )
            .await;
            reply(&mut socket, serde_json::json!({"type": "typing"})).await;
            reply(&mut socket, serde_json::json!({"no_type": true})).await;
            reply(
                &mut socket,
                serde_json::json!({"type": "error", "message": "bad command"}),
            )
            .await;
            reply(
                &mut socket,
                serde_json::json!({
                    "type": "history_list",
                    "history": [{"id": "1700000000000", "title": "first question"}]
                }),
            )
            .await;
            reply(
                &mut socket,
                serde_json::json!({
                    "type": "chat_history",
                    "id": "1700000000000",
                    "messages": [
                        {"role": "user", "content": "a\nb"},
                        {"role": "assistant", "content": "use `x`"}
                    ]
                }),
            )
            .await;
            socket
        });

        let (sink, mut events) = event_channel();
        let mut transport = WebSocketTransport::new(url, sink);
        transport.connect().await.unwrap();
        transport
            .send(ChatCommand::Chat {
                target: target(1),
                message: "q".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::stream(target(1), StreamPayload::Chunk("partial".to_string()))
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::stream(
                target(1),
                StreamPayload::Failed {
                    kind: ErrorKind::ProtocolError,
                    message: "boom".to_string()
                }
            )
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::ServerError("bad command".to_string())
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::HistoryList(vec![HistoryItem {
                id: "1700000000000".to_string(),
                title: "first question".to_string(),
            }])
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::ConversationLoaded {
                id: "1700000000000".to_string(),
                messages: vec![
                    WireMessage::new(WireRole::User, "a\nb"),
                    WireMessage::new(WireRole::Assistant, "use `x`"),
                ],
            }
        );

        let _socket = server.await.unwrap();
    }

    #[tokio::test]
    async fn remote_close_reports_disconnect() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut socket = accept(&listener).await;
            socket.close(None).await.unwrap();
        });

        let (sink, mut events) = event_channel();
        let mut transport = WebSocketTransport::new(url, sink);
        transport.connect().await.unwrap();
        server.await.unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected { .. }
        ));
        for _ in 0..100 {
            if !transport.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!transport.is_connected());

        let error = transport.send(ChatCommand::History).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportUnavailable);
    }

    #[tokio::test]
    async fn send_without_connecting_is_rejected() {
        let (sink, _events) = event_channel();
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/ws", sink);
        let error = transport.send(ChatCommand::History).await.unwrap_err();
        assert!(matches!(error, crate::TransportError::NotConnected { .. }));
        assert_eq!(error.kind(), ErrorKind::TransportUnavailable);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_unavailable() {
        let (listener, url) = listen().await;
        drop(listener);

        let (sink, _events) = event_channel();
        let mut transport = WebSocketTransport::new(url, sink);
        let error = transport.connect().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportUnavailable);
        assert!(!transport.is_connected());
    }
}
