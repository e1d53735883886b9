#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Cron(#[from] cron::error::Error),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("schedule not found: {0}")]
    NotFound(String),
}

impl From<Error> for agent_common::Error {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(id) => agent_common::Error::not_found(format!("schedule not found: {id}")),
            _ => agent_common::Error::external("agent-scheduler", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
