//! Wire types for the agent host's socket protocol: every JSON frame that
//! can cross a connection, tagged by its `type` field exactly as named in
//! the external interfaces section of the host specification.

pub mod error;
pub mod frame;

pub use error::ErrorShape;
pub use frame::{AgentFrame, RpcError, StreamFrameEnvelope};

/// Maximum size of a single inbound frame, in bytes. Frames larger than
/// this are rejected before JSON parsing is attempted.
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576;

/// Maximum UTF-8 byte length of a single persisted chat message row
/// (messages table). See the chat subsystem's row-size guard.
pub const MAX_MESSAGE_BYTES: usize = 1_887_436; // 1.8 MiB, matches the 1.8 MB spec figure

/// Number of buffered stream frames (or the timer below) that triggers a
/// flush of the chunk buffer to the embedded store.
pub const STREAM_FLUSH_BATCH: usize = 10;

/// Timer-based flush interval for the stream chunk buffer, in milliseconds.
pub const STREAM_FLUSH_INTERVAL_MS: u64 = 50;
