use snafu::Snafu;

/// Coarse classification used by callers to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not connected, or the network refused the request.
    TransportUnavailable,
    /// The peer answered, but not with something usable.
    ProtocolError,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("{transport} transport is not connected"))]
    NotConnected {
        stage: &'static str,
        transport: &'static str,
    },
    #[snafu(display("failed to connect websocket at {url}: {source}"))]
    WebSocketConnect {
        stage: &'static str,
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("websocket send failed on `{stage}`: {source}"))]
    WebSocketSend {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("failed to encode `{command}` command: {source}"))]
    EncodeCommand {
        stage: &'static str,
        command: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("http request failed on `{stage}`: {source}"))]
    Http {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("server answered {url} with status {status}: {body}"))]
    HttpStatus {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response from {url}: {source}"))]
    DecodeResponse {
        stage: &'static str,
        url: String,
        source: serde_json::Error,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected { .. }
            | Self::WebSocketConnect { .. }
            | Self::WebSocketSend { .. }
            | Self::Http { .. } => ErrorKind::TransportUnavailable,
            Self::EncodeCommand { .. } | Self::HttpStatus { .. } | Self::DecodeResponse { .. } => {
                ErrorKind::ProtocolError
            }
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotConnected { stage, .. }
            | Self::WebSocketConnect { stage, .. }
            | Self::WebSocketSend { stage, .. }
            | Self::EncodeCommand { stage, .. }
            | Self::Http { stage, .. }
            | Self::HttpStatus { stage, .. }
            | Self::DecodeResponse { stage, .. } => stage,
        }
    }
}
