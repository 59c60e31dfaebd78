//! Socket abstraction and the production WebSocket connector.
//!
//! The session only ever sees text frames through the [`Socket`] trait; ping
//! handling, binary frames, and TLS are transport concerns kept below this
//! seam. Tests inject the in-memory connector from [`crate::testutil`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Socket-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("failed to open socket to {url}: {message}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying failure description.
        message: String,
    },

    /// A send on an open socket failed.
    #[error("socket send failed: {0}")]
    Send(String),

    /// A receive on an open socket failed.
    #[error("socket read failed: {0}")]
    Recv(String),
}

/// Opens sockets to the gateway. Injected into the session so tests can
/// substitute an in-memory implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError>;
}

#[async_trait]
impl<C> Connector for std::sync::Arc<C>
where
    C: Connector + ?Sized,
{
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        (**self).connect(url).await
    }
}

/// One open message-oriented socket.
#[async_trait]
pub trait Socket: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// `None` means the peer closed the connection; `Some(Err(_))` is a
    /// transport fault after which no further frames will arrive.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the socket. Best-effort; errors are swallowed.
    async fn close(&mut self);
}

/// Production connector over tokio-tungstenite.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        tracing::debug!(url, "websocket open");
        Ok(Box::new(WsSocket { inner: stream }))
    }
}

struct WsSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                // Pings are answered by tungstenite during the read; binary
                // frames are not part of the gateway protocol.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(TransportError::Recv(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            tracing::debug!(error = %e, "websocket close failed");
        }
    }
}
