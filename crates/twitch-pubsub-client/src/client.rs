//! Session lifecycle: connect, reconnect, subscribe, close.
//!
//! # Reconnect ordering
//!
//! A reconnect runs at most once at a time (guarded by a compare-and-swap
//! into [`ConnectionState::Connecting`]) and proceeds in this order:
//!
//! 1. stop the current read loop; unless the read loop itself triggered the
//!    reconnect, wait for it to exit so it never reads again
//! 2. detach the write half, so new writes fail fast instead of landing on
//!    the dying socket
//! 3. cancel every pending request
//! 4. close the old socket and dial a new one
//! 5. take the subscription gate, install the new session, send a PING and
//!    replay the subscription set as one LISTEN before callers get the gate
//!
//! A failed dial leaves the state at [`ConnectionState::Down`]; the surviving
//! heartbeat monitor (or the caller) retries later.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use twitch_pubsub_core::{IncomingEnvelope, OutgoingEnvelope, RequestType, Topic, TopicPayload};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::correlator::{Correlator, FrameWriter, Outcome, PendingResponse};
use crate::dispatcher;
use crate::error::ClientError;
use crate::handlers::{HandlerTable, Handlers};
use crate::liveness::{self, Heartbeat, Verdict};
use crate::registry::SubscriptionRegistry;
use crate::state::{ConnectionState, StateCell};
use crate::transport::{Connector, FrameSink, Transport, WebSocketConnector};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a reconnect was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    ReadFailure,
    DecodeFailure,
    ServerDirective,
    Heartbeat(Verdict),
    Manual,
}

impl Trigger {
    fn from_read_loop(self) -> bool {
        matches!(
            self,
            Trigger::ReadFailure | Trigger::DecodeFailure | Trigger::ServerDirective
        )
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::ReadFailure => write!(f, "read failure"),
            Trigger::DecodeFailure => write!(f, "undecodable frame"),
            Trigger::ServerDirective => write!(f, "broker directive"),
            Trigger::Heartbeat(verdict) => write!(f, "heartbeat: {verdict}"),
            Trigger::Manual => write!(f, "requested by caller"),
        }
    }
}

struct ReadLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// State shared by the caller, the read loop and the heartbeat monitor.
pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) handlers: HandlerTable,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) heartbeat: Heartbeat,
    connector: Arc<dyn Connector>,
    state: StateCell,
    generation: AtomicU64,
    writer: FrameWriter,
    registry: SubscriptionRegistry,
    read_loop: Mutex<Option<ReadLoop>>,
    last_error: Mutex<Option<ClientError>>,
    // Held for a whole LISTEN/UNLISTEN round trip, and by a reconnect from
    // before the session turns Up until its replay completes.
    subscriptions: tokio::sync::Mutex<()>,
}

impl Inner {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) async fn ping(&self) -> Result<(), ClientError> {
        self.writer.send(&OutgoingEnvelope::ping()).await?;
        self.heartbeat.record_ping(self.clock.now());
        Ok(())
    }

    async fn dial(&self) -> Result<Transport, ClientError> {
        self.connector
            .connect(&self.config.endpoint)
            .await
            .map_err(|source| ClientError::Dial {
                endpoint: self.config.endpoint.clone(),
                source,
            })
    }

    /// Install `transport` as the live session, start its read loop and
    /// heartbeat, and send the first PING.
    ///
    /// Fails with `NotConnected` when the client was closed while dialing.
    async fn start_session(self: &Arc<Self>, transport: Transport) -> Result<u64, ClientError> {
        let Transport { sink, stream } = transport;
        self.writer.replace(Some(sink)).await;
        self.heartbeat.reset(self.clock.now());

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        // The read loop is registered before the session turns Up, so a
        // reconnect or close can always find it, but reads nothing until Up.
        let cancel = CancellationToken::new();
        let (start, started) = oneshot::channel();
        let handle = tokio::spawn(dispatcher::run(
            Arc::clone(self),
            stream,
            cancel.clone(),
            started,
            generation,
        ));
        *self.read_loop.lock() = Some(ReadLoop { handle, cancel });

        if let Err(state) = self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Up)
        {
            tracing::debug!(
                generation,
                ?state,
                "client closed while dialing, dropping new connection"
            );
            self.stop_read_loop(false).await;
            close_sink(self.writer.replace(None).await).await;
            return Err(ClientError::NotConnected);
        }
        let _ = start.send(());

        tokio::spawn(liveness::run(Arc::clone(self), generation));
        tracing::info!(generation, endpoint = %self.config.endpoint, "session up");

        if let Err(e) = self.ping().await {
            tracing::debug!(generation, error = %e, "initial ping failed");
        }
        Ok(generation)
    }

    async fn stop_read_loop(&self, wait: bool) {
        let read_loop = self.read_loop.lock().take();
        let Some(ReadLoop { handle, cancel }) = read_loop else {
            return;
        };
        cancel.cancel();
        if wait {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "read loop ended abnormally");
            }
        }
    }

    /// Tear the session down and dial a new one.
    ///
    /// A no-op while another reconnect is in flight or after close.
    pub(crate) fn reconnect(self: &Arc<Self>, trigger: Trigger) -> BoxFuture<'static, ()> {
        let this = Arc::clone(self);
        async move { this.reconnect_inner(trigger).await }.boxed()
    }

    async fn reconnect_inner(self: Arc<Self>, trigger: Trigger) {
        let previous = match self.state.begin_reconnect() {
            Ok(previous) => previous,
            Err(state) => {
                tracing::debug!(%trigger, ?state, "reconnect skipped");
                return;
            }
        };
        tracing::info!(%trigger, ?previous, endpoint = %self.config.endpoint, "reconnecting");
        *self.last_error.lock() = None;

        self.stop_read_loop(!trigger.from_read_loop()).await;
        let old_sink = self.writer.replace(None).await;
        let flushed = self.correlator.flush();
        if flushed > 0 {
            tracing::debug!(flushed, "cancelled pending requests");
        }
        close_sink(old_sink).await;

        let transport = match self.dial().await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, "reconnect failed");
                *self.last_error.lock() = Some(e);
                if let Err(state) = self
                    .state
                    .transition(ConnectionState::Connecting, ConnectionState::Down)
                {
                    tracing::debug!(?state, "client closed while dialing, staying closed");
                }
                return;
            }
        };

        let _gate = self.subscriptions.lock().await;
        let Ok(generation) = self.start_session(transport).await else {
            return;
        };

        let topics = self.registry.snapshot();
        if !topics.is_empty() {
            tracing::debug!(generation, count = topics.len(), "replaying subscriptions");
            let replay = OutgoingEnvelope::listen(topics, &self.config.auth_token);
            if let Err(e) = self.exchange(replay).await {
                tracing::warn!(generation, error = %e, "failed to replay subscriptions");
                *self.last_error.lock() = Some(e);
            }
        }
        tracing::info!(generation, "reconnected");
    }

    /// Send a LISTEN/UNLISTEN and apply it to the registry once acknowledged.
    ///
    /// Callers hold the subscription gate.
    async fn exchange(&self, envelope: OutgoingEnvelope) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Up {
            return Err(ClientError::NotConnected);
        }
        let operation = envelope.kind;
        let topics = envelope.data.topics.clone();

        let (mut pending, written) = self.correlator.issue(&self.writer, envelope).await;
        written?;

        match pending.wait().await {
            Outcome::Response(response) if response.is_success() => {
                match operation {
                    RequestType::Listen => {
                        self.registry.merge(&topics);
                    }
                    RequestType::Unlisten => {
                        self.registry.remove(&topics);
                    }
                    RequestType::Ping => {}
                }
                tracing::debug!(%operation, count = topics.len(), "acknowledged");
                Ok(())
            }
            Outcome::Response(response) => Err(ClientError::OperationFailed {
                operation,
                reason: response.error,
            }),
            Outcome::Cancelled => Err(ClientError::Cancelled),
            Outcome::Closed => Err(ClientError::NoResponse),
        }
    }

    async fn subscription_request(&self, envelope: OutgoingEnvelope) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Up {
            return Err(ClientError::NotConnected);
        }
        let _gate = self.subscriptions.lock().await;
        self.exchange(envelope).await
    }

    async fn close(&self) {
        if self.state.close() == ConnectionState::Closed {
            return;
        }
        self.stop_read_loop(false).await;
        let old_sink = self.writer.replace(None).await;
        self.correlator.flush();
        close_sink(old_sink).await;
        tracing::info!(endpoint = %self.config.endpoint, "session closed");
    }
}

async fn close_sink(sink: Option<FrameSink>) {
    let Some(mut sink) = sink else {
        return;
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to close previous connection"),
        Err(_) => tracing::warn!("timed out closing previous connection"),
    }
}

/// Handle to one PubSub session. Cheap to clone; all clones share the session.
///
/// The read loop and heartbeat keep running until [`Client::close`] is called.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connect over WebSocket with no handlers registered.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::builder(config).connect().await
    }

    /// Start listening to `topics`.
    ///
    /// The subscription set only changes once the broker acknowledges.
    pub async fn subscribe(
        &self,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<(), ClientError> {
        let topics = topics.into_iter().collect();
        let envelope = OutgoingEnvelope::listen(topics, &self.inner.config.auth_token);
        self.inner.subscription_request(envelope).await
    }

    /// Stop listening to `topics`.
    pub async fn unsubscribe(
        &self,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<(), ClientError> {
        let topics = topics.into_iter().collect();
        let envelope = OutgoingEnvelope::unlisten(topics, &self.inner.config.auth_token);
        self.inner.subscription_request(envelope).await
    }

    /// Send a raw request and get an accessor for its response.
    ///
    /// The nonce is assigned here. If the write fails the accessor resolves
    /// to [`Outcome::Closed`].
    pub async fn request(
        &self,
        envelope: OutgoingEnvelope,
    ) -> (PendingResponse, Result<(), ClientError>) {
        self.inner.correlator.issue(&self.inner.writer, envelope).await
    }

    /// Register the handler for `T`'s topic category.
    pub fn on<T, F>(&self, callback: F)
    where
        T: TopicPayload,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.handlers.update(|h| {
            h.on(callback);
        });
    }

    /// Register a hook that sees every frame.
    pub fn observe<F>(&self, callback: F)
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.inner.handlers.update(|h| {
            h.observe(callback);
        });
    }

    /// Register the fallback for frames nothing else handled.
    pub fn on_unknown<F>(&self, callback: F)
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.inner.handlers.update(|h| {
            h.unknown(callback);
        });
    }

    /// Replace every handler at once.
    pub fn set_handlers(&self, handlers: Handlers) {
        self.inner.handlers.update(|h| *h = handlers);
    }

    /// Topics acknowledged by the broker.
    pub fn topics(&self) -> Vec<Topic> {
        self.inner.registry.snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Up
    }

    /// Error from the most recent reconnect, if it failed.
    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.last_error.lock().clone()
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Tear down the session and dial again.
    pub async fn reconnect(&self) {
        self.inner.reconnect(Trigger::Manual).await;
    }

    /// Close the session for good. Pending requests are cancelled.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.inner.state())
            .field("generation", &self.inner.generation())
            .finish()
    }
}

/// Configures handlers and seams before the first connect.
pub struct ClientBuilder {
    config: ClientConfig,
    handlers: Handlers,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: Handlers::new(),
            connector: Arc::new(WebSocketConnector),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn on<T, F>(mut self, callback: F) -> Self
    where
        T: TopicPayload,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.handlers.on(callback);
        self
    }

    pub fn observe<F>(mut self, callback: F) -> Self
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.handlers.observe(callback);
        self
    }

    pub fn on_unknown<F>(mut self, callback: F) -> Self
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.handlers.unknown(callback);
        self
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Dial the broker and start the session.
    ///
    /// Fails with [`ClientError::Dial`] when the first dial fails; no retry
    /// is attempted.
    pub async fn connect(self) -> Result<Client, ClientError> {
        let now = self.clock.now();
        let inner = Arc::new(Inner {
            config: self.config,
            clock: self.clock,
            handlers: HandlerTable::new(self.handlers),
            correlator: Correlator::new(),
            heartbeat: Heartbeat::new(now),
            connector: self.connector,
            state: StateCell::new(ConnectionState::Connecting),
            generation: AtomicU64::new(0),
            writer: FrameWriter::default(),
            registry: SubscriptionRegistry::default(),
            read_loop: Mutex::new(None),
            last_error: Mutex::new(None),
            subscriptions: tokio::sync::Mutex::new(()),
        });

        tracing::info!(endpoint = %inner.config.endpoint, "connecting");
        let transport = inner.dial().await?;
        inner.start_session(transport).await?;
        Ok(Client { inner })
    }
}
