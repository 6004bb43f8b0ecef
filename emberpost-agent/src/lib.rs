//! Library surface of emberpost-agent.
//!
//! The binary in `main.rs` is a thin wrapper; exposing the modules here
//! keeps the orchestrator, identity, and sender testable from the
//! integration suite.

pub mod agent;
pub mod cli;
pub mod error;
pub mod identity;
pub mod logging;
pub mod report;
pub mod sender;

pub use agent::Agent;
pub use error::AgentError;
pub use identity::Identity;
pub use sender::{Sender, SenderConfig};
