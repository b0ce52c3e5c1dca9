//! Tool registry, command synthesis, and sandboxed dispatch.
//!
//! The flow for one invocation: schema lookup → argument validation →
//! scope gate → command synthesis → ephemeral sandbox run → output parse →
//! failure classification. Schemas live on disk, one JSON document per
//! tool, seeded with builtins and extendable by the offline
//! [`documenter::AutoDocumenter`].

pub mod command;
pub mod dispatcher;
pub mod documenter;
pub mod output;
pub mod registry;
pub mod sandbox;
pub mod schema;

pub use dispatcher::{DispatchError, ToolDispatcher, ToolExecution};
pub use registry::ToolRegistry;
pub use sandbox::{RunOutput, SandboxError, SandboxLimits, SandboxRunner, ToolRunner};
pub use schema::{OutputFormat, ParamType, ToolParameter, ToolSchema};
