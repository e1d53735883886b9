#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] agent_store::Error),
    #[error("mcp server '{0}' not found")]
    NotFound(String),
    #[error("mcp server '{0}' is not ready (state: {1})")]
    NotReady(String, String),
    #[error("oauth error: {0}")]
    OAuth(String),
    #[error("remote error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for agent_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(name) => agent_common::Error::not_found(format!("mcp server '{name}' not found")),
            other => agent_common::Error::external("agent-mcp-client", other),
        }
    }
}
