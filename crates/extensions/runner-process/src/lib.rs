//! Process-based agent runner.
//!
//! Bridges the [`browserpilot_protocols::AgentRunner`] contract to an
//! external agent command, typically the operator's browser-extension
//! bridge script.

pub mod bridge;

pub use bridge::ProcessAgentRunner;
