use futures::StreamExt;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use tokio::task::JoinHandle;

use crate::error::{
    DecodeResponseSnafu, HttpSnafu, HttpStatusSnafu, NotConnectedSnafu, TransportError,
    TransportResult,
};
use crate::event::{StreamPayload, TransportEvent, TransportEventSink};
use crate::sse::SseDecoder;
use crate::target::StreamTarget;
use crate::transport::{BoxFuture, ChatTransport, TransportKind};
use crate::wire::{ChatCommand, ChatRequestBody, HistoryItem, SaveRequestBody, WireMessage};

const CHAT_PATH: &str = "/api/chat";
const HISTORY_PATH: &str = "/api/history";

/// Request-response transport: a streamed `POST /api/chat` per message and
/// plain REST calls for history.
///
/// There is no persistent connection; `connect` only arms the transport.
pub struct HttpStreamTransport {
    client: reqwest::Client,
    base_url: String,
    events: TransportEventSink,
    connected: bool,
    in_flight: Vec<JoinHandle<()>>,
}

impl HttpStreamTransport {
    pub fn new(base_url: impl Into<String>, events: TransportEventSink) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, events)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        events: TransportEventSink,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            events,
            connected: false,
            in_flight: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn transmit(&mut self, command: ChatCommand) -> TransportResult<()> {
        ensure!(
            self.connected,
            NotConnectedSnafu {
                stage: "http-send",
                transport: "http",
            }
        );

        match command {
            ChatCommand::Chat { target, message } => {
                self.in_flight.retain(|handle| !handle.is_finished());
                let worker = run_chat_stream(
                    self.client.clone(),
                    self.url(CHAT_PATH),
                    message,
                    target,
                    self.events.clone(),
                );
                self.in_flight.push(tokio::spawn(worker));
                Ok(())
            }
            ChatCommand::History => {
                let history: Vec<HistoryItem> =
                    self.get_json(HISTORY_PATH, "fetch-history-list").await?;
                self.events.emit(TransportEvent::HistoryList(history));
                Ok(())
            }
            ChatCommand::Load { id } => {
                let path = format!("{HISTORY_PATH}/{id}");
                let messages: Vec<WireMessage> = self.get_json(&path, "load-conversation").await?;
                self.events
                    .emit(TransportEvent::ConversationLoaded { id, messages });
                Ok(())
            }
            ChatCommand::Save { id, messages } => {
                let url = self.url(HISTORY_PATH);
                let response = self
                    .client
                    .post(&url)
                    .json(&SaveRequestBody {
                        id: &id,
                        messages: &messages,
                    })
                    .send()
                    .await
                    .context(HttpSnafu {
                        stage: "save-conversation",
                    })?;
                ensure_success(response, &url, "save-conversation-status").await?;
                self.events.emit(TransportEvent::Saved);
                Ok(())
            }
        }
    }

    async fn get_json<T>(&self, path: &str, stage: &'static str) -> TransportResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(HttpSnafu { stage })?;
        let response = ensure_success(response, &url, stage).await?;
        let body = response.text().await.context(HttpSnafu { stage })?;

        serde_json::from_str(&body).context(DecodeResponseSnafu { stage, url })
    }

    fn abort_in_flight(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for HttpStreamTransport {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}

impl ChatTransport for HttpStreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect<'a>(&'a mut self) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.connected = true;
            tracing::info!(base_url = %self.base_url, "http transport ready");
            Ok(())
        })
    }

    fn disconnect<'a>(&'a mut self) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.connected {
                tracing::info!(base_url = %self.base_url, "http transport closed");
            }
            self.connected = false;
            self.abort_in_flight();
        })
    }

    fn send<'a>(&'a mut self, command: ChatCommand) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.transmit(command))
    }
}

async fn ensure_success(
    response: reqwest::Response,
    url: &str,
    stage: &'static str,
) -> TransportResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    HttpStatusSnafu {
        stage,
        url: url.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
    .fail()
}

/// Streams one response into the event sink, ending with exactly one terminal event.
async fn run_chat_stream(
    client: reqwest::Client,
    url: String,
    message: String,
    target: StreamTarget,
    events: TransportEventSink,
) {
    let response = match open_chat_stream(&client, &url, &message).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(
                stream_target = ?target,
                stage = error.stage(),
                error = %error,
                "failed to open chat stream"
            );
            emit_failure(&events, target, &error);
            return;
        }
    };

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(item) = body.next().await {
        match item {
            Ok(bytes) => {
                for data in decoder.push(&bytes) {
                    if !events.emit(TransportEvent::stream(target, StreamPayload::Chunk(data))) {
                        return;
                    }
                }
            }
            Err(source) => {
                let error = TransportError::Http {
                    stage: "read-chat-stream",
                    source,
                };
                tracing::warn!(stream_target = ?target, error = %error, "chat stream read failed");
                emit_failure(&events, target, &error);
                return;
            }
        }
    }

    if let Some(data) = decoder.finish() {
        events.emit(TransportEvent::stream(target, StreamPayload::Chunk(data)));
    }
    events.emit(TransportEvent::stream(target, StreamPayload::End));
}

async fn open_chat_stream(
    client: &reqwest::Client,
    url: &str,
    message: &str,
) -> TransportResult<reqwest::Response> {
    let response = client
        .post(url)
        .json(&ChatRequestBody { message })
        .send()
        .await
        .context(HttpSnafu {
            stage: "open-chat-stream",
        })?;
    ensure_success(response, url, "chat-stream-status").await
}

fn emit_failure(events: &TransportEventSink, target: StreamTarget, error: &TransportError) {
    events.emit(TransportEvent::stream(
        target,
        StreamPayload::Failed {
            kind: error.kind(),
            message: error.to_string(),
        },
    ));
}
