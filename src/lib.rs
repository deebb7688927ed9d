//! Coding-activity telemetry agent.
//!
//! One invocation runs a fixed pipeline over a small batch of
//! heartbeats (sanitize, enrich, validate), then hands the survivors to
//! the dispatcher, which drains the durable offline queue ahead of them
//! and makes one delivery attempt against the collector.

pub mod api;
pub mod cli;
pub mod deps;
pub mod filestats;
pub mod heartbeat;
pub mod language;
pub mod offline;
pub mod project;
pub mod settings;
