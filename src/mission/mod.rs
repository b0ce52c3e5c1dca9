//! Mission orchestration: the durable workflow, its activities and journal,
//! and the manager that spawns and controls workflow instances.

pub mod activities;
pub mod journal;
pub mod manager;
pub mod workflow;

pub use activities::{Activities, ActivityOutcome};
pub use journal::ActivityJournal;
pub use manager::{ManagerError, MissionManager};
pub use workflow::{
    parse_signal, MissionControl, MissionSignal, MissionWorkflow, SignalParseError,
    StatusSnapshot, WorkflowPhase,
};
