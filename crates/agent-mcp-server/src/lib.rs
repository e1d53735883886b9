pub mod dispatch;
pub mod error;
pub mod router;
pub mod session;
pub mod types;

pub use dispatch::{DispatchOutcome, McpDispatcher};
pub use error::{Error, Result};
pub use router::{McpServerState, SESSION_ID_HEADER, router};
pub use session::{Session, SessionManager};
