//! Handler table for pushed events.
//!
//! Each topic category maps to at most one [`TopicHandler`], which knows how
//! to decode the frame's message into its typed record and invoke the
//! caller's callback. Two untyped hooks sit around the typed ones: an
//! observer that sees every frame, and a fallback for frames nothing else
//! handled.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use twitch_pubsub_core::{IncomingEnvelope, TopicKind, TopicPayload};

/// Callback receiving a raw envelope.
pub type EnvelopeHandler = Arc<dyn Fn(&IncomingEnvelope) + Send + Sync>;

/// Decodes and handles frames of one topic category.
pub trait TopicHandler: Send + Sync {
    fn kind(&self) -> TopicKind;

    /// Decode the frame's message and invoke the callback.
    ///
    /// A decode error means the callback was not invoked.
    fn handle(&self, envelope: &IncomingEnvelope) -> Result<(), serde_json::Error>;
}

/// Adapter from a typed callback to [`TopicHandler`].
struct Typed<T, F> {
    callback: F,
    _payload: PhantomData<fn(T)>,
}

impl<T, F> TopicHandler for Typed<T, F>
where
    T: TopicPayload,
    F: Fn(T) + Send + Sync,
{
    fn kind(&self) -> TopicKind {
        T::KIND
    }

    fn handle(&self, envelope: &IncomingEnvelope) -> Result<(), serde_json::Error> {
        let payload = envelope.decode::<T>()?;
        (self.callback)(payload);
        Ok(())
    }
}

/// A set of handlers, built before connecting or swapped in at runtime.
#[derive(Clone, Default)]
pub struct Handlers {
    topics: HashMap<TopicKind, Arc<dyn TopicHandler>>,
    observer: Option<EnvelopeHandler>,
    unknown: Option<EnvelopeHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `T`'s category, replacing any previous one.
    pub fn on<T, F>(&mut self, callback: F) -> &mut Self
    where
        T: TopicPayload,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.insert(Arc::new(Typed {
            callback,
            _payload: PhantomData,
        }))
    }

    /// Register a custom handler under its own category.
    pub fn insert(&mut self, handler: Arc<dyn TopicHandler>) -> &mut Self {
        self.topics.insert(handler.kind(), handler);
        self
    }

    /// Hook invoked for every decoded frame before routing.
    pub fn observe<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(callback));
        self
    }

    /// Hook invoked for frames no other stage handled.
    pub fn unknown<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&IncomingEnvelope) + Send + Sync + 'static,
    {
        self.unknown = Some(Arc::new(callback));
        self
    }

    pub fn is_registered(&self, kind: TopicKind) -> bool {
        self.topics.contains_key(&kind)
    }
}

/// Shared, swappable handler table read by the dispatcher.
///
/// Lookups clone the handler out so no lock is held while a callback runs.
#[derive(Default)]
pub(crate) struct HandlerTable(RwLock<Handlers>);

impl HandlerTable {
    pub(crate) fn new(handlers: Handlers) -> Self {
        Self(RwLock::new(handlers))
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Handlers)) {
        f(&mut self.0.write());
    }

    pub(crate) fn topic(&self, kind: TopicKind) -> Option<Arc<dyn TopicHandler>> {
        self.0.read().topics.get(&kind).cloned()
    }

    pub(crate) fn observer(&self) -> Option<EnvelopeHandler> {
        self.0.read().observer.clone()
    }

    pub(crate) fn unknown(&self) -> Option<EnvelopeHandler> {
        self.0.read().unknown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use twitch_pubsub_core::{MessageData, WhisperEvent};

    fn whisper(message: &str) -> IncomingEnvelope {
        IncomingEnvelope {
            kind: "MESSAGE".into(),
            data: MessageData {
                topic: "whispers.1".into(),
                message: message.into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn typed_handler_decodes_and_invokes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut handlers = Handlers::new();
        handlers.on(move |event: WhisperEvent| sink.lock().push(event.kind));

        let table = HandlerTable::new(handlers);
        let handler = table.topic(TopicKind::Whispers).unwrap();
        assert_eq!(handler.kind(), TopicKind::Whispers);
        handler.handle(&whisper(r#"{"type":"thread"}"#)).unwrap();
        assert_eq!(*seen.lock(), vec!["thread".to_string()]);
    }

    #[test]
    fn decode_failure_skips_callback() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut handlers = Handlers::new();
        handlers.on(move |_: WhisperEvent| *counter.lock() += 1);

        let handler = HandlerTable::new(handlers).topic(TopicKind::Whispers).unwrap();
        assert!(handler.handle(&whisper("{broken")).is_err());
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn registration_replaces_previous() {
        let mut handlers = Handlers::new();
        handlers.on(|_: WhisperEvent| {});
        assert!(handlers.is_registered(TopicKind::Whispers));
        assert!(!handlers.is_registered(TopicKind::Bits));

        let table = HandlerTable::default();
        assert!(table.topic(TopicKind::Whispers).is_none());
        table.update(|h| {
            h.on(|_: WhisperEvent| {}).unknown(|_| {});
        });
        assert!(table.topic(TopicKind::Whispers).is_some());
        assert!(table.unknown().is_some());
        assert!(table.observer().is_none());
    }
}
