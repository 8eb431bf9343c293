//! The read loop and its routing pipeline.
//!
//! Every decoded frame goes through the same ordered stages, first match
//! wins:
//!
//! 1. observer hook (never consumes the frame)
//! 2. control frames: `PONG` updates the heartbeat, `RECONNECT` ends the loop
//! 3. responses whose nonce matches an outstanding request
//! 4. data frames whose topic category has a handler that decodes the message
//! 5. the unknown-frame fallback

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use twitch_pubsub_core::{ControlFrame, IncomingEnvelope, TopicKind};

use crate::client::{Inner, Trigger};
use crate::clock::Clock;
use crate::correlator::Correlator;
use crate::handlers::HandlerTable;
use crate::liveness::Heartbeat;
use crate::state::ConnectionState;
use crate::transport::FrameStream;

/// Which stage consumed a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Pong,
    Reconnect,
    Response,
    Topic(TopicKind),
    Unknown,
}

pub(crate) struct Pipeline<'a> {
    handlers: &'a HandlerTable,
    correlator: &'a Correlator,
    heartbeat: &'a Heartbeat,
    clock: &'a dyn Clock,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(
        handlers: &'a HandlerTable,
        correlator: &'a Correlator,
        heartbeat: &'a Heartbeat,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            handlers,
            correlator,
            heartbeat,
            clock,
        }
    }

    pub(crate) fn route(&self, envelope: IncomingEnvelope) -> Route {
        if let Some(observer) = self.handlers.observer() {
            observer(&envelope);
        }

        match envelope.control() {
            Some(ControlFrame::Pong) => {
                self.heartbeat.record_pong(self.clock.now());
                return Route::Pong;
            }
            Some(ControlFrame::Reconnect) => return Route::Reconnect,
            None => {}
        }

        let envelope = match self.correlator.deliver(envelope) {
            Ok(()) => return Route::Response,
            Err(unmatched) => unmatched,
        };

        if let Some(kind) = self.dispatch_topic(&envelope) {
            return Route::Topic(kind);
        }

        match self.handlers.unknown() {
            Some(unknown) => unknown(&envelope),
            None => tracing::debug!(
                kind = %envelope.kind,
                topic = %envelope.data.topic,
                "unhandled frame, no unknown-frame handler registered"
            ),
        }
        Route::Unknown
    }

    // A message that fails to decode counts as unhandled.
    fn dispatch_topic(&self, envelope: &IncomingEnvelope) -> Option<TopicKind> {
        if envelope.data.topic.is_empty() {
            return None;
        }
        let kind = envelope.topic_kind();
        if kind == TopicKind::Invalid {
            return None;
        }
        let handler = self.handlers.topic(kind)?;
        match handler.handle(envelope) {
            Ok(()) => Some(kind),
            Err(e) => {
                tracing::warn!(
                    topic = %envelope.data.topic,
                    error = %e,
                    "failed to decode message"
                );
                None
            }
        }
    }
}

/// Read frames from `stream` until the session ends.
///
/// Nothing is read until `started` fires, which happens once the session is
/// Up; a dropped `started` means the session never came up.
///
/// A read or decode failure, or a broker `RECONNECT`, hands over to
/// [`Inner::reconnect`] and ends this loop; a successful reconnect starts a
/// fresh one. Cancellation ends the loop without reading another frame.
pub(crate) async fn run(
    inner: Arc<Inner>,
    mut stream: FrameStream,
    cancel: CancellationToken,
    started: oneshot::Receiver<()>,
    generation: u64,
) {
    let up = tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        started = started => started.is_ok(),
    };
    if !up {
        tracing::debug!(generation, "session never came up, read loop not started");
        return;
    }
    tracing::debug!(generation, "read loop started");

    let trigger = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(generation, "read loop cancelled");
                return;
            }
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                tracing::warn!(generation, error = %e, "read failed");
                break Trigger::ReadFailure;
            }
            None => {
                tracing::warn!(generation, "connection closed by peer");
                break Trigger::ReadFailure;
            }
        };

        let envelope = match serde_json::from_str::<IncomingEnvelope>(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(generation, error = %e, "failed to decode frame");
                break Trigger::DecodeFailure;
            }
        };

        let pipeline = Pipeline::new(
            &inner.handlers,
            &inner.correlator,
            &inner.heartbeat,
            inner.clock.as_ref(),
        );
        match pipeline.route(envelope) {
            Route::Reconnect => {
                tracing::info!(generation, "broker requested a reconnect");
                break Trigger::ServerDirective;
            }
            route => tracing::trace!(generation, ?route, "frame routed"),
        }
    };

    // An intentional close or a reconnect started elsewhere already owns the teardown.
    let superseded = cancel.is_cancelled() || inner.state() != ConnectionState::Up;
    if trigger != Trigger::ServerDirective && superseded {
        tracing::debug!(generation, "read loop exiting, session already going down");
        return;
    }
    inner.reconnect(trigger).await;
}
