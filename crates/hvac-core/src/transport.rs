//! Push channel transport.
//!
//! The connection manager only needs "open a channel, read text frames,
//! write text frames, close". These traits describe that surface so the
//! WebSocket implementation can be swapped for
//! [`MockTransport`](crate::mock::MockTransport) in tests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Path of the sensor push channel on the API server.
pub const SENSOR_CHANNEL_PATH: &str = "/ws/sensors";

/// Errors raised by a push transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The channel URL could not be derived or parsed.
    #[error("Invalid push channel URL: {0}")]
    InvalidUrl(String),

    /// WebSocket protocol or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The channel was already closed.
    #[error("Channel closed")]
    Closed,

    /// Failure reported by a non-WebSocket transport.
    #[error("{0}")]
    Other(String),
}

/// Opens push channels.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Open a new channel to `url`.
    async fn open(&self, url: &str) -> Result<Box<dyn PushChannel>, TransportError>;
}

/// One open duplex channel carrying text frames.
#[async_trait]
pub trait PushChannel: Send {
    /// Receive the next text frame.
    ///
    /// Returns `None` once the remote end has closed the channel.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Send a text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel. Errors are ignored; the channel is unusable afterwards.
    async fn close(&mut self);
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn PushChannel>, TransportError> {
        let (stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by server");
                    return None;
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Derive the push channel URL from the REST base URL.
///
/// `http://host:8000` becomes `ws://host:8000/ws/sensors` and `https://`
/// becomes `wss://`.
pub fn channel_url(base_url: &str) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(TransportError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {base_url}"
        )));
    };
    Ok(format!("{ws_base}{SENSOR_CHANNEL_PATH}"))
}
