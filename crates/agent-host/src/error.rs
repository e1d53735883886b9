#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown agent type '{0}'")]
    UnknownAgentType(String),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Store(#[from] agent_store::Error),
    #[error(transparent)]
    Scheduler(#[from] agent_scheduler::Error),
    #[error(transparent)]
    McpClient(#[from] agent_mcp_client::Error),
    #[error(transparent)]
    Email(#[from] agent_email::Error),
    #[error(transparent)]
    Agent(#[from] agent_common::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for agent_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::UnknownAgentType(name) => agent_common::Error::not_found(format!("unknown agent type '{name}'")),
            Error::Agent(inner) => inner,
            other => agent_common::Error::internal(other.to_string()),
        }
    }
}
