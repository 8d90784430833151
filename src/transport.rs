use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

/// Errors from the duplex socket itself, distinct from protocol-level
/// [`crate::error::HostError`] (§4.A).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("received a non-text frame")]
    NonTextFrame,
}

/// Carries UTF-8 text frames over one duplex websocket connection and
/// tracks "peer closed" (§4.A). `tokio-tungstenite` is the idiomatic Rust
/// stand-in for the original `websocketpp` transport (§B); the teacher's own
/// demo binaries build on `tokio` the same way.
#[derive(Debug)]
pub struct Transport<S> {
    socket: WebSocketStream<S>,
    peer_closed: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(socket: WebSocketStream<S>) -> Self {
        Transport {
            socket,
            peer_closed: false,
        }
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Sends one text frame. A no-op once the peer is known closed (§4.A);
    /// any other send failure is returned for the caller to treat as fatal.
    pub async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.peer_closed {
            return Ok(());
        }
        match self.socket.send(WsMessage::Text(frame)).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => {
                self.peer_closed = true;
                Ok(())
            }
            Err(e) => Err(TransportError::WebSocket(e.to_string())),
        }
    }

    /// Waits for the next frame. `Ok(None)` means the peer closed cleanly;
    /// subsequent calls keep returning `Ok(None)`.
    pub async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if self.peer_closed {
            return Ok(None);
        }
        loop {
            match self.socket.next().await {
                None => {
                    self.peer_closed = true;
                    return Ok(None);
                }
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Close(_))) => {
                    self.peer_closed = true;
                    return Ok(None);
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(_)) => return Err(TransportError::NonTextFrame),
                Some(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)) => {
                    self.peer_closed = true;
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
            }
        }
    }
}
