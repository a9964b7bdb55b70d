//! WebSocket feed transport.
//!
//! Wraps a `tokio-tungstenite` stream behind [`FeedTransport`]. Pings are
//! answered by tungstenite itself on the next read or write; binary and pong
//! frames are ignored.

use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::port::{FeedTransport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real-time feed over a WebSocket.
pub struct WebSocketTransport {
    url: String,
    ws: Option<Socket>,
}

impl WebSocketTransport {
    /// Create a disconnected transport for `url`.
    #[must_use]
    pub const fn new(url: String) -> Self {
        Self { url, ws: None }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.ws.is_some()
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<()> {
        self.ws = None;
        info!(url = %self.url, "Connecting to WebSocket");
        let (ws, response) = connect_async(self.url.as_str()).await?;
        info!(status = %response.status(), "WebSocket connected");
        self.ws = Some(ws);
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| Error::Connection("Not connected".into()))?;
        trace!(bytes = text.len(), "Sending WebSocket text frame");
        ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let ws = self.ws.as_mut()?;

        loop {
            let Some(message) = ws.next().await else {
                self.ws = None;
                return None;
            };
            match message {
                Ok(Message::Text(text)) => {
                    trace!(bytes = text.len(), "Received WebSocket text frame");
                    return Some(TransportEvent::Text(text));
                }
                Ok(Message::Close(frame)) => {
                    info!(frame = ?frame, "WebSocket closed by server");
                    self.ws = None;
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.into_owned())
                    });
                    return Some(TransportEvent::Closed { code, reason });
                }
                Ok(Message::Ping(_)) => trace!("Received WebSocket ping"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    self.ws = None;
                    return Some(TransportEvent::Error(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let Some(mut ws) = self.ws.take() else {
            return Ok(());
        };
        debug!(code, reason, "Closing WebSocket");
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        ws.close(Some(frame)).await?;
        Ok(())
    }
}
