pub mod address;
pub mod error;
pub mod resolver;
pub mod route;
pub mod sign;

pub use error::{Error, Result, SecureReplyFailure};
pub use resolver::{AddressBasedResolver, CatchAllResolver, EmailResolver, InboundEmail, LegacyHeaderTrustResolver, SecureReplyResolver};
pub use route::{EmailDelivery, route_agent_email};
pub use sign::{DEFAULT_MAX_AGE, SignedHeaders, sign_agent_headers, verify_agent_headers};
