use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown mcp-session-id")]
    UnknownSession,
    #[error("missing Accept header")]
    MissingAccept,
    #[error("Accept header must include application/json or text/event-stream")]
    UnacceptableAccept,
    #[error("invalid JSON-RPC payload: {0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Dispatch(#[from] agent_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::UnknownSession => StatusCode::NOT_FOUND,
            Error::MissingAccept | Error::UnacceptableAccept => StatusCode::NOT_ACCEPTABLE,
            Error::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Error::Dispatch(err) => StatusCode::from_u16(err.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Error::Dispatch(err) => err.client_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody { error: self.client_message() };
        (status, axum::Json(body)).into_response()
    }
}
