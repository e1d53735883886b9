use serde::Serialize;

/// The error-kind enum from the error handling design: every failure
/// surfaced to a client carries one of these, never more detail than that
/// (signature failures in particular must not leak which check failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Unauthorized,
    Conflict,
    Canceled,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Conflict => 409,
            ErrorKind::Canceled => 499,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind:?}: {message}")]
    Kind { kind: ErrorKind, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::Conflict,
            message: message.into(),
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::Canceled,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Kind {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The `ErrorKind` this error reports to a client. I/O, JSON, and
    /// external errors are always reported as `internal` — their detail
    /// stays in the logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kind { kind, .. } => *kind,
            Error::Io(_) | Error::Json(_) | Error::External { .. } => ErrorKind::Internal,
        }
    }

    /// The message a client is allowed to see.
    pub fn client_message(&self) -> String {
        match self {
            Error::Kind { message, .. } => message.clone(),
            _ => "internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_http_status_matches_error_handling_design() {
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorKind::Unauthorized.http_status(), 401);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn external_errors_report_as_internal_to_clients() {
        let err = Error::external("db", std::io::Error::other("boom"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.client_message(), "internal error");
    }

    #[test]
    fn kind_errors_preserve_their_message() {
        let err = Error::not_found("agent not registered");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.client_message(), "agent not registered");
    }
}
