//! In-memory broker for driving a [`Client`] end to end.
#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink, stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use twitch_pubsub_client::{
    Client, ClientConfig, ConnectionState, Connector, Handlers, HeartbeatPolicy, ManualClock,
    Transport, TransportError,
};
use twitch_pubsub_core::{OutgoingEnvelope, RequestType};

pub const START: i64 = 1001;
const WAIT: Duration = Duration::from_secs(2);

/// Write half handed to the client. Fails once the broker stops reading.
struct ChannelSink(mpsc::UnboundedSender<String>);

impl Sink<String> for ChannelSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: String) -> Result<(), Self::Error> {
        self.0.send(frame).map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Connector that hands the broker side of every dial to the test.
pub struct MockConnector {
    dials: AtomicUsize,
    failures: AtomicUsize,
    greeting: Mutex<Option<String>>,
    servers: mpsc::UnboundedSender<ServerConn>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            dials: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            greeting: Mutex::new(None),
            servers,
        });
        (connector, accepted)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Make the next `count` dials fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Queue `frame` on the next connection before the dial returns.
    pub fn greet_next(&self, frame: impl Into<String>) {
        *self.greeting.lock() = Some(frame.into());
    }
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<Transport, TransportError>> {
        async move {
            self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransportError::Dial(format!("{endpoint}: connection refused")));
            }

            let (frames_tx, frames) = mpsc::unbounded_channel();
            let (inbound, inbound_rx) =
                mpsc::unbounded_channel::<Result<String, TransportError>>();
            if let Some(frame) = self.greeting.lock().take() {
                let _ = inbound.send(Ok(frame));
            }
            let stream = stream::unfold(inbound_rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            let _ = self.servers.send(ServerConn { frames, inbound });
            Ok(Transport::new(ChannelSink(frames_tx), stream))
        }
        .boxed()
    }
}

/// Broker side of one connection.
pub struct ServerConn {
    frames: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl ServerConn {
    /// Next frame written by the client.
    pub async fn next_frame(&mut self) -> OutgoingEnvelope {
        let frame = tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection");
        serde_json::from_str(&frame).expect("client wrote an invalid envelope")
    }

    /// Next non-PING frame written by the client.
    pub async fn next_request(&mut self) -> OutgoingEnvelope {
        loop {
            let envelope = self.next_frame().await;
            if envelope.kind != RequestType::Ping {
                return envelope;
            }
        }
    }

    /// Read the next request and answer it with `error` ("" for success).
    pub async fn answer(&mut self, error: &str) -> OutgoingEnvelope {
        let request = self.next_request().await;
        self.respond(&request, error);
        request
    }

    pub fn respond(&self, request: &OutgoingEnvelope, error: &str) {
        self.send_json(serde_json::json!({
            "type": "RESPONSE",
            "nonce": request.nonce,
            "error": error,
        }));
    }

    pub fn send_json(&self, value: serde_json::Value) {
        self.send_raw(&value.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.inbound.send(Ok(text.to_string()));
    }

    pub fn fail_read(&self) {
        let _ = self.inbound.send(Err(TransportError::Read("connection reset".into())));
    }

    /// Assert the client writes nothing within `window`.
    pub async fn no_frame(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, self.frames.recv()).await;
        assert!(result.is_err(), "unexpected client frame: {result:?}");
    }

    /// Stop accepting frames; further client writes fail.
    pub fn stop_reading(&mut self) {
        self.frames.close();
    }

    /// Wait until the client drops its write half.
    pub async fn closed(&mut self) {
        let drained = tokio::time::timeout(WAIT, async {
            while self.frames.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "client kept the connection open");
    }
}

pub struct Harness {
    pub client: Client,
    pub clock: Arc<ManualClock>,
    pub connector: Arc<MockConnector>,
    servers: mpsc::UnboundedReceiver<ServerConn>,
}

pub fn config() -> ClientConfig {
    ClientConfig::new("token")
        .with_endpoint("mock://pubsub")
        .with_heartbeat(HeartbeatPolicy {
            poll_interval_ms: 5,
            ..HeartbeatPolicy::default()
        })
}

impl Harness {
    pub async fn connect(handlers: Handlers) -> (Self, ServerConn) {
        let (connector, servers) = MockConnector::new();
        let clock = Arc::new(ManualClock::new(START));
        let client = Client::builder(config())
            .handlers(handlers)
            .connector(connector.clone())
            .clock(clock.clone())
            .connect()
            .await
            .expect("connect");

        let mut harness = Self {
            client,
            clock,
            connector,
            servers,
        };
        let mut server = harness.next_server().await;
        assert_eq!(server.next_frame().await.kind, RequestType::Ping);
        (harness, server)
    }

    /// The broker side of the next successful dial.
    pub async fn next_server(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.servers.recv())
            .await
            .expect("timed out waiting for a dial")
            .expect("connector dropped")
    }

    /// Assert no dial succeeds within `window`.
    pub async fn no_new_server(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, self.servers.recv()).await;
        assert!(result.is_err(), "unexpected dial");
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let reached = tokio::time::timeout(WAIT, async {
            while self.client.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            reached.is_ok(),
            "client stuck in {:?}, wanted {state:?}",
            self.client.state()
        );
    }
}
