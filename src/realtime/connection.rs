//! Pluggable persistent connection.
//!
//! The channel only needs `open`, `send`, `recv` and `close`; the production
//! connector speaks WebSocket through `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[async_trait]
pub trait ConnectionSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait ConnectionStream: Send {
    /// Next inbound frame; `None` once the peer closed.
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

/// An open connection, split into its two directions.
pub struct Connection {
    pub sink: Box<dyn ConnectionSink>,
    pub stream: Box<dyn ConnectionStream>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Connection>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Connection> {
        let (ws, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Connection(format!("websocket connect failed: {}", e)))?;
        tracing::debug!(status = response.status().as_u16(), "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        Ok(Connection {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsSource(stream)),
        })
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl ConnectionSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(bytes) => Message::binary(bytes),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .close()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl ConnectionStream for WsSource {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(frame = ?frame, "Peer closed connection");
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(Error::Connection(e.to_string()))),
            }
        }
    }
}
