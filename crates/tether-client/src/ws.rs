//! WebSocket transport backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tether_core::TransportError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::connection::{Connector, FrameSink, FrameStream, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the orchestrator's WebSocket endpoint.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Transport, TransportError> {
        let (ws, response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: self.url.clone(),
                    message: e.to_string(),
                })?;
        debug!(url = %self.url, status = %response.status(), "websocket handshake complete");
        let (sink, stream) = ws.split();
        Ok(Transport {
            sink: Box::new(WsSink { inner: sink }),
            stream: Box::new(WsFrames { inner: stream }),
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsFrames {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsFrames {
    async fn next_text(&mut self) -> Result<String, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "close frame received");
                    return Err(TransportError::Closed);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }
}
