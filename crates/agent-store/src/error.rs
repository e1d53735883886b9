#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<Error> for agent_common::Error {
    fn from(err: Error) -> Self {
        agent_common::Error::external("agent-store", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
