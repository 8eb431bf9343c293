//! Twitch PubSub listener.
//!
//! Connects, subscribes to the configured topics and logs every event until
//! interrupted.
//!
//!   twitch-pubsub --token $TOKEN --topic channel-bits-events-v2.46024993
//!   twitch-pubsub --config pubsub.toml

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use twitch_pubsub_client::{Client, Handlers};
use twitch_pubsub_core::{
    BitsBadgeUnlock, BitsEvent, CommerceEvent, ModerationAction, SubscriptionEvent, WhisperEvent,
};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "twitch-pubsub", about = "Listen to Twitch PubSub topics and log every event")]
struct Args {
    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// OAuth token.
    #[arg(long, env = "TWITCH_PUBSUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Broker endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Topic to listen to (repeatable).
    #[arg(long = "topic", short)]
    topics: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("twitch_pubsub=info,twitch_pubsub_client=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply(args.token, args.endpoint, args.topics);
    config.validate()?;
    let topics = config.topics()?;

    let client = Client::builder(config.client)
        .handlers(event_log())
        .connect()
        .await
        .context("connecting to broker")?;

    if !topics.is_empty() {
        client.subscribe(topics).await.context("subscribing")?;
    }
    tracing::info!(topics = ?client.topics(), "listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.close().await;
    Ok(())
}

fn event_log() -> Handlers {
    let mut handlers = Handlers::new();
    handlers
        .on(|e: BitsEvent| {
            tracing::info!(
                channel = %e.data.channel_name,
                user = %e.data.user_name,
                bits = e.data.bits_used,
                message = %e.data.chat_message,
                "bits"
            );
        })
        .on(|e: BitsBadgeUnlock| {
            tracing::info!(
                channel = %e.channel_name,
                user = %e.user_name,
                tier = e.badge_tier,
                "bits badge"
            );
        })
        .on(|e: SubscriptionEvent| {
            tracing::info!(
                channel = %e.channel_name,
                user = %e.display_name,
                plan = %e.sub_plan,
                months = e.months,
                context = %e.context,
                "subscription"
            );
        })
        .on(|e: CommerceEvent| {
            tracing::info!(
                channel = %e.channel_name,
                user = %e.display_name,
                item = %e.item_description,
                "purchase"
            );
        })
        .on(|e: WhisperEvent| {
            tracing::info!(kind = %e.kind, thread = %e.data_object.id, "whisper");
        })
        .on(|e: ModerationAction| {
            tracing::info!(
                action = %e.data.moderation_action,
                by = %e.data.created_by,
                args = ?e.data.args,
                "moderation"
            );
        })
        .unknown(|envelope| {
            tracing::debug!(kind = %envelope.kind, topic = %envelope.data.topic, "unhandled frame");
        });
    handlers
}
