pub mod agent;
pub mod config;

pub use agent::{Agent, Routines};
pub use config::AgentConfig;
