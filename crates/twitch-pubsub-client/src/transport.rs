//! Transport seam.
//!
//! The session engine only needs to dial an endpoint, write text frames and
//! read text frames. [`WebSocketConnector`] provides that over
//! `tokio-tungstenite`; tests substitute an in-memory [`Connector`].

use std::pin::Pin;

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// Write half: one `String` per frame.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Read half: one `String` per frame. The stream ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An established connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Dials new transports.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Transport, TransportError>>;
}

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("connection closed")]
    Closed,
}

/// WebSocket transport (TLS via rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Transport, TransportError>> {
        async move {
            let (ws, _response) = tokio_tungstenite::connect_async(endpoint)
                .await
                .map_err(|e| TransportError::Dial(e.to_string()))?;
            let (sink, stream) = ws.split();

            let sink = sink
                .sink_map_err(|e| TransportError::Write(e.to_string()))
                .with(|frame: String| {
                    future::ready(Ok::<_, TransportError>(Message::Text(frame.into())))
                });
            let stream = stream.filter_map(|msg| future::ready(frame_text(msg)));

            Ok(Transport::new(sink, stream))
        }
        .boxed()
    }
}

// Ping/pong at the websocket layer is answered by tungstenite itself.
fn frame_text(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(
            String::from_utf8(bytes.to_vec()).map_err(|e| TransportError::Read(e.to_string())),
        ),
        Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
        Ok(_) => None,
        Err(e) => Some(Err(TransportError::Read(e.to_string()))),
    }
}
