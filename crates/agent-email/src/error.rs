#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecureReplyFailure {
    MissingHeaders,
    Expired,
    Invalid,
    MalformedTimestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("address '{0}' is not a valid email address")]
    InvalidAddress(String),
    #[error("secure-reply verification failed: {0:?}")]
    SecureReply(SecureReplyFailure),
    #[error("no resolver matched this email")]
    Unresolved,
    #[error("{0}")]
    SigningRejected(&'static str),
    #[error(
        "the header-trust resolver was removed; headers are not a trustworthy identity source on their own. \
         Use the secure-reply resolver (HMAC-signed headers) or the address-based resolver instead."
    )]
    LegacyResolverRemoved,

    #[error(transparent)]
    Delivery(#[from] agent_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
