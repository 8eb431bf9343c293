//! Client-side session engine for the Twitch PubSub protocol.
//!
//! A [`Client`] owns one logical session with the broker. It keeps the
//! socket alive with a ping/pong heartbeat, correlates LISTEN/UNLISTEN
//! requests with their responses, routes pushed events to typed handlers,
//! and re-establishes the session (replaying subscriptions) when the
//! connection fails or the broker asks for a reconnect.
//!
//! ```no_run
//! use twitch_pubsub_client::{Client, ClientConfig};
//! use twitch_pubsub_core::{BitsEvent, Topic};
//!
//! # async fn run() -> Result<(), twitch_pubsub_client::ClientError> {
//! let client = Client::builder(ClientConfig::new("oauth-token"))
//!     .on(|event: BitsEvent| println!("{} bits", event.data.bits_used))
//!     .connect()
//!     .await?;
//! client.subscribe([Topic::bits(46024993)]).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod clock;
mod config;
mod correlator;
mod dispatcher;
mod error;
mod handlers;
mod liveness;
mod registry;
mod state;
mod transport;

pub use client::{Client, ClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, HeartbeatPolicy};
pub use correlator::{Outcome, PendingResponse};
pub use error::ClientError;
pub use handlers::{EnvelopeHandler, Handlers, TopicHandler};
pub use liveness::Verdict;
pub use state::ConnectionState;
pub use transport::{
    Connector, FrameSink, FrameStream, Transport, TransportError, WebSocketConnector,
};
