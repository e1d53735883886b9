pub mod config;
pub mod email_bridge;
pub mod error;
pub mod http;
pub mod instance;
pub mod mcp_bridge;
pub mod registry;
pub mod ws;

pub use config::{Cli, HostConfig};
pub use error::{Error, Result};
pub use instance::{AgentFactory, AgentInstance};
pub use registry::InstanceRegistry;
