//! External pub/sub bridge over Redis.
//!
//! Outbound: every workflow event is published to a tenant-prefixed Redis
//! channel (at-least-once: one retry on error). Inbound: a single owner
//! task subscribes to the well-known channels and forwards messages to the
//! in-process fabric, so observers attached to other processes see the same
//! stream. Bridge failure degrades to in-process delivery only and never
//! blocks the workflow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::types::Event;

use super::fabric::{event_frame, EventFabric};
use super::{route_for, EventRoute};

/// Named channels the bridge subscribes to.
const NAMED_CHANNELS: &[&str] = &[
    "agent_events",
    "scan_updates",
    "graph_updates",
    "findings",
    "notifications",
];

/// Base delay before the inbound task reconnects after a failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Base delay plus up to two seconds of jitter.
fn reconnect_delay() -> Duration {
    use rand::Rng;
    let jitter_ms = rand::thread_rng().gen_range(0..2_000);
    RECONNECT_DELAY.saturating_add(Duration::from_millis(jitter_ms))
}

/// Redis-backed event bridge.
#[derive(Debug, Clone)]
pub struct EventBridge {
    client: redis::Client,
    namespace: String,
}

impl EventBridge {
    /// Create a bridge from a Redis URL and tenant namespace.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid.
    pub fn new(redis_url: &str, namespace: impl Into<String>) -> redis::RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            namespace: namespace.into(),
        })
    }

    /// Verify the backend answers before serving.
    ///
    /// # Errors
    ///
    /// Returns the underlying Redis error when the connection fails.
    pub async fn check_connection(&self) -> redis::RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Publish one event outbound.
    ///
    /// Each event goes to exactly one namespace-prefixed channel per
    /// [`route_for`]: its mission's `job_logs:<id>` channel for
    /// mission-scoped topics, the topic's fleet-wide channel otherwise.
    /// One retry on publish failure gives at-least-once across the bridge.
    pub async fn publish_event(&self, event: &Event) {
        let payload = match serde_json::to_string(&event_frame(event)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize event for bridge");
                return;
            }
        };

        let channel = match route_for(event.topic) {
            EventRoute::JobLog => {
                format!("{}:job_logs:{}", self.namespace, event.mission_id)
            }
            EventRoute::Fleet(name) => format!("{}:{}", self.namespace, name),
        };

        if let Err(first) = self.try_publish(&channel, &payload).await {
            debug!(channel = %channel, error = %first, "publish failed; retrying once");
            if let Err(second) = self.try_publish(&channel, &payload).await {
                warn!(channel = %channel, error = %second, "event publish dropped");
            }
        }
    }

    async fn try_publish(&self, channel: &str, payload: &str) -> redis::RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Run the inbound side: forward bridge messages to the fabric.
    ///
    /// Intended to be spawned once per process. Reconnects with a fixed
    /// delay on failure; cancellation-safe (aborting the task is the
    /// shutdown path).
    pub async fn run_inbound(self, fabric: Arc<EventFabric>) {
        loop {
            match self.subscribe_and_forward(&fabric).await {
                Ok(()) => {
                    info!("bridge inbound stream ended; reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, "bridge inbound failed; reconnecting");
                }
            }
            tokio::time::sleep(reconnect_delay()).await;
        }
    }

    async fn subscribe_and_forward(&self, fabric: &Arc<EventFabric>) -> redis::RedisResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;

        pubsub
            .psubscribe(format!("{}:job_logs:*", self.namespace))
            .await?;
        for channel in NAMED_CHANNELS {
            pubsub
                .subscribe(format!("{}:{}", self.namespace, channel))
                .await?;
        }
        info!(namespace = %self.namespace, "bridge subscribed");

        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let channel = message.get_channel_name().to_owned();
            let payload: String = match message.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "undecodable bridge payload");
                    continue;
                }
            };

            let frame: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(f) => f,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "bridge payload is not JSON");
                    continue;
                }
            };

            // Strip the namespace prefix to recover the logical channel.
            let logical = channel
                .strip_prefix(&format!("{}:", self.namespace))
                .unwrap_or(&channel);

            if logical.starts_with("job_logs:") {
                fabric.broadcast_to_channel(logical, &frame);
            } else {
                fabric.broadcast(&frame);
            }
        }

        Ok(())
    }
}
