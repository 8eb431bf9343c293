//! Request/response correlation by nonce.
//!
//! Each outstanding request owns a one-shot slot keyed by a fresh nonce.
//! The read loop delivers the matching response into the slot; a reconnect
//! flushes every slot with an explicit cancellation so waiters can tell a
//! dropped request from a slow one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use twitch_pubsub_core::{IncomingEnvelope, OutgoingEnvelope};
use uuid::Uuid;

use crate::error::ClientError;
use crate::transport::FrameSink;

/// What a slot can receive.
#[derive(Debug)]
enum Delivery {
    Response(IncomingEnvelope),
    Flushed,
}

/// Result of waiting on a [`PendingResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The broker answered.
    Response(IncomingEnvelope),
    /// A reconnect or close discarded the request.
    Cancelled,
    /// The slot closed without a value: the write failed, or the outcome was
    /// already taken by an earlier call to [`PendingResponse::wait`].
    Closed,
}

/// Table of outstanding requests.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    pending: Mutex<HashMap<String, oneshot::Sender<Delivery>>>,
}

impl Correlator {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stamp a fresh nonce onto `envelope` and write it while holding the
    /// write lock.
    ///
    /// The returned accessor is valid even when the write fails; it then
    /// resolves to [`Outcome::Closed`].
    pub(crate) async fn issue(
        self: &Arc<Self>,
        writer: &FrameWriter,
        mut envelope: OutgoingEnvelope,
    ) -> (PendingResponse, Result<(), ClientError>) {
        let mut sink = writer.lock().await;
        let pending = self.register();
        envelope.nonce = Some(pending.nonce.clone());
        let written = sink.write(&envelope).await;
        drop(sink);

        if written.is_err() {
            self.release(&pending.nonce);
        }
        (pending, written)
    }

    fn register(self: &Arc<Self>) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        let nonce = loop {
            let nonce = Uuid::new_v4().to_string();
            if !pending.contains_key(&nonce) {
                break nonce;
            }
        };
        pending.insert(nonce.clone(), tx);
        PendingResponse {
            nonce,
            rx: Some(rx),
            correlator: Arc::clone(self),
        }
    }

    /// Hand `envelope` to the request waiting on its nonce.
    ///
    /// Gives the envelope back when no request matches.
    pub(crate) fn deliver(&self, envelope: IncomingEnvelope) -> Result<(), IncomingEnvelope> {
        if envelope.nonce.is_empty() {
            return Err(envelope);
        }
        let Some(tx) = self.pending.lock().remove(&envelope.nonce) else {
            return Err(envelope);
        };
        if tx.send(Delivery::Response(envelope)).is_err() {
            tracing::debug!("response arrived after its waiter went away");
        }
        Ok(())
    }

    /// Cancel every outstanding request. Returns how many were flushed.
    pub(crate) fn flush(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Delivery::Flushed);
        }
        count
    }

    fn release(&self, nonce: &str) {
        self.pending.lock().remove(nonce);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[cfg(test)]
    fn contains(&self, nonce: &str) -> bool {
        self.pending.lock().contains_key(nonce)
    }
}

/// Accessor for one outstanding request.
///
/// Dropping it releases the request's slot.
#[derive(Debug)]
pub struct PendingResponse {
    nonce: String,
    rx: Option<oneshot::Receiver<Delivery>>,
    correlator: Arc<Correlator>,
}

impl PendingResponse {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Wait for the response.
    ///
    /// Only the first call can observe a value; later calls return
    /// [`Outcome::Closed`] immediately.
    pub async fn wait(&mut self) -> Outcome {
        let Some(rx) = self.rx.take() else {
            return Outcome::Closed;
        };
        let outcome = match rx.await {
            Ok(Delivery::Response(envelope)) => Outcome::Response(envelope),
            Ok(Delivery::Flushed) => Outcome::Cancelled,
            Err(_) => Outcome::Closed,
        };
        self.correlator.release(&self.nonce);
        outcome
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.correlator.release(&self.nonce);
    }
}

/// The single write path shared by every task.
///
/// Holds the current write half; `None` while no transport is installed.
#[derive(Default)]
pub(crate) struct FrameWriter {
    sink: tokio::sync::Mutex<Option<FrameSink>>,
}

impl FrameWriter {
    #[cfg(test)]
    pub(crate) fn from_sink(sink: FrameSink) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(Some(sink)),
        }
    }

    pub(crate) async fn lock(&self) -> WriteGuard<'_> {
        WriteGuard(self.sink.lock().await)
    }

    pub(crate) async fn send(&self, envelope: &OutgoingEnvelope) -> Result<(), ClientError> {
        self.lock().await.write(envelope).await
    }

    /// Install a new write half, returning the previous one.
    pub(crate) async fn replace(&self, sink: Option<FrameSink>) -> Option<FrameSink> {
        std::mem::replace(&mut *self.sink.lock().await, sink)
    }
}

pub(crate) struct WriteGuard<'a>(tokio::sync::MutexGuard<'a, Option<FrameSink>>);

impl WriteGuard<'_> {
    pub(crate) async fn write(&mut self, envelope: &OutgoingEnvelope) -> Result<(), ClientError> {
        use futures_util::SinkExt;

        let frame =
            serde_json::to_string(envelope).map_err(|e| ClientError::Encode(e.to_string()))?;
        let sink = self.0.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(frame).await?;
        Ok(())
    }
}
