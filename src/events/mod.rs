//! Event fabric: in-process pub/sub plus the external Redis bridge.

pub mod bridge;
pub mod fabric;

pub use bridge::EventBridge;
pub use fabric::{event_frame, EventFabric, Frame};

use std::sync::Arc;

use crate::types::{Event, EventTopic};

/// Delivery route for one event topic.
///
/// Every event travels exactly one path: mission-scoped step progress goes
/// to that mission's `job_logs:<id>` channel subscribers; everything else
/// is a fleet-wide frame broadcast to all observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    /// Mission-scoped: delivered on the mission's `job_logs:<id>` channel.
    JobLog,
    /// Fleet-wide: broadcast to every observer; named channel on the bridge.
    Fleet(&'static str),
}

/// Route an event topic to its single delivery path.
pub fn route_for(topic: EventTopic) -> EventRoute {
    match topic {
        EventTopic::StepBegin
        | EventTopic::StepComplete
        | EventTopic::ScopeViolation
        | EventTopic::BudgetWarning => EventRoute::JobLog,
        EventTopic::PlanProposal | EventTopic::AgentThought => EventRoute::Fleet("agent_events"),
        EventTopic::Status => EventRoute::Fleet("scan_updates"),
        EventTopic::Finding => EventRoute::Fleet("findings"),
        EventTopic::GraphUpdate => EventRoute::Fleet("graph_updates"),
    }
}

/// The workflow-facing emitter: in-process fan-out plus optional bridge.
#[derive(Debug, Clone)]
pub struct EventSink {
    fabric: Arc<EventFabric>,
    bridge: Option<EventBridge>,
}

impl EventSink {
    /// Create a sink over the fabric and an optional bridge.
    pub fn new(fabric: Arc<EventFabric>, bridge: Option<EventBridge>) -> Self {
        Self { fabric, bridge }
    }

    /// Emit one event: immediate in-process delivery, then the bridge.
    pub async fn emit(&self, event: &Event) {
        self.fabric.publish(event);
        if let Some(bridge) = &self.bridge {
            bridge.publish_event(event).await;
        }
    }

    /// The underlying in-process fabric.
    pub fn fabric(&self) -> &Arc<EventFabric> {
        &self.fabric
    }
}
