//! In-process event multiplexer.
//!
//! Observers connect, receive a session id and a bounded queue, and
//! subscribe to channels. Delivery is fire-and-forget: a subscriber whose
//! queue is full is evicted rather than ever blocking the producer.
//!
//! Synchronization is read-majority: broadcast takes the map read lock;
//! connect/disconnect briefly take the write lock; per-subscriber queues
//! are independent.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::Event;

/// Depth of each subscriber's queue.
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// Frames delivered to observers.
pub type Frame = serde_json::Value;

/// The in-process pub/sub multiplexer.
#[derive(Debug, Default)]
pub struct EventFabric {
    /// session id → outbound queue.
    connections: RwLock<HashMap<String, mpsc::Sender<Frame>>>,
    /// channel → subscribed session ids.
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
}

impl EventFabric {
    /// Create an empty fabric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer session.
    ///
    /// Returns the session id and the receiving end of its frame queue.
    pub fn connect(&self) -> (String, mpsc::Receiver<Frame>) {
        let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);

        if let Ok(mut connections) = self.connections.write() {
            connections.insert(session_id.clone(), tx);
            info!(session_id = %session_id, total = connections.len(), "observer connected");
        }

        (session_id, rx)
    }

    /// Remove a session and all of its subscriptions.
    pub fn disconnect(&self, session_id: &str) {
        if let Ok(mut connections) = self.connections.write() {
            if connections.remove(session_id).is_some() {
                info!(session_id = %session_id, total = connections.len(), "observer disconnected");
            }
        }
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            for sessions in subscriptions.values_mut() {
                sessions.remove(session_id);
            }
        }
    }

    /// Subscribe a session to a channel (e.g. `job_logs:mission-1`).
    pub fn subscribe(&self, session_id: &str, channel: &str) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions
                .entry(channel.to_owned())
                .or_default()
                .insert(session_id.to_owned());
            debug!(session_id = %session_id, channel = %channel, "subscribed");
        }
    }

    /// Unsubscribe a session from a channel.
    pub fn unsubscribe(&self, session_id: &str, channel: &str) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            if let Some(sessions) = subscriptions.get_mut(channel) {
                sessions.remove(session_id);
            }
            debug!(session_id = %session_id, channel = %channel, "unsubscribed");
        }
    }

    /// Send a frame to one session. Slow or gone sessions are evicted.
    pub fn send_to_session(&self, session_id: &str, frame: Frame) {
        let sender = self
            .connections
            .read()
            .ok()
            .and_then(|c| c.get(session_id).cloned());

        if let Some(tx) = sender {
            if tx.try_send(frame).is_err() {
                warn!(session_id = %session_id, "subscriber queue overflow; evicting");
                self.disconnect(session_id);
            }
        }
    }

    /// Broadcast a frame to all connected sessions.
    pub fn broadcast(&self, frame: &Frame) {
        let targets: Vec<(String, mpsc::Sender<Frame>)> = match self.connections.read() {
            Ok(connections) => connections
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect(),
            Err(_) => return,
        };

        let mut evicted = Vec::new();
        for (session_id, tx) in targets {
            if tx.try_send(frame.clone()).is_err() {
                evicted.push(session_id);
            }
        }
        for session_id in evicted {
            warn!(session_id = %session_id, "subscriber queue overflow; evicting");
            self.disconnect(&session_id);
        }
    }

    /// Send a frame to every session subscribed to a channel.
    pub fn broadcast_to_channel(&self, channel: &str, frame: &Frame) {
        let sessions: Vec<String> = match self.subscriptions.read() {
            Ok(subscriptions) => subscriptions
                .get(channel)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => return,
        };

        for session_id in sessions {
            self.send_to_session(&session_id, frame.clone());
        }
    }

    /// Publish a mission event to observers.
    ///
    /// The event is framed as `server:<topic>` and delivered on exactly one
    /// path per [`route_for`](super::route_for): mission-scoped frames go to
    /// the `job_logs:<mission_id>` channel subscribers only, fleet-wide
    /// frames are broadcast to all connected sessions.
    pub fn publish(&self, event: &Event) {
        let frame = event_frame(event);
        match super::route_for(event.topic) {
            super::EventRoute::JobLog => {
                self.broadcast_to_channel(&format!("job_logs:{}", event.mission_id), &frame);
            }
            super::EventRoute::Fleet(_) => self.broadcast(&frame),
        }
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.connections.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Render an event as an observer frame.
pub fn event_frame(event: &Event) -> Frame {
    serde_json::json!({
        "type": format!("server:{}", event.topic.as_str()),
        "mission_id": event.mission_id,
        "kind": event.kind,
        "timestamp": event.timestamp.to_rfc3339(),
        "payload": event.payload,
    })
}
