//! Process supervision for the runner agent.
//!
//! Spawns the provider's agent binary, merges its stdio into one serialized
//! stream of parsed lifecycle events, and reports process exit through the
//! same channel.

mod command;

mod parser;
pub use parser::parse_agent_line;

mod supervisor;
pub use supervisor::{AgentSupervisor, LineConfig};
