use twitch_pubsub_core::RequestType;

use crate::transport::TransportError;

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The session is not up; nothing was written.
    #[error("not connected")]
    NotConnected,
    /// The broker answered with a non-empty error field.
    #[error("{operation} failed: {reason}")]
    OperationFailed {
        operation: RequestType,
        reason: String,
    },
    /// The transport could not be established.
    #[error("failed to dial {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode request: {0}")]
    Encode(String),
    /// The pending request was flushed by a reconnect or close.
    #[error("request cancelled before a response arrived")]
    Cancelled,
    /// The request's slot closed without a value.
    #[error("no response received")]
    NoResponse,
}
