//! Conversation orchestration engine: the Conversation Monitor, Tool
//! Approval Gate, MCP Client Manager, Session Manager and Resource
//! Subscription Monitor that together drive one multi-adapter AI chat
//! agent.

pub mod approval;
pub mod bus;
pub mod config;
pub mod error;
pub mod history;
pub mod mcp_manager;
pub mod monitor;
pub mod resource_monitor;
pub mod runner;
pub mod sampling;
pub mod session;
pub mod tools;
pub mod types;

pub use error::AgentError;
pub use monitor::{AgentFactory, ConversationMonitor};
pub use types::{ConversationKey, Prompt, ResponseUpdate};
