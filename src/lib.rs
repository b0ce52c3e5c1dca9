//! SentryAI mission execution core.
//!
//! An autonomous security-assessment orchestrator: a language-model agent
//! plans and executes reconnaissance and vulnerability scans against
//! operator-approved targets, under three non-negotiable safety contracts
//! (scope, budget, loop prevention), streaming structured progress to
//! observers.
//!
//! Component map:
//!
//! - [`scope`] — the kill switch vetting every outbound target
//! - [`budget`] — step/cost/time/retry governors and loop detection
//! - [`tools`] — tool schemas, registry, command synthesis, sandbox dispatch
//! - [`agent`] — prompt assembly and the LLM guardrail loop
//! - [`events`] — in-process pub/sub and the Redis bridge
//! - [`mission`] — the durable workflow, activities, journal, and manager
//! - [`integrations`] — outbound chat/ticketing notifications
//! - [`adapters`] — storage contracts (mission rows, graph, vector)
//! - [`server`] — REST control API and the WebSocket observer channel

pub mod adapters;
pub mod agent;
pub mod budget;
pub mod config;
pub mod context;
pub mod events;
pub mod integrations;
pub mod logging;
pub mod mission;
pub mod scope;
pub mod server;
pub mod tools;
pub mod types;
