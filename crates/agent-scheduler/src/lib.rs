//! Durable one-shot, interval, and cron scheduling, driven by a single
//! alarm-based dispatch loop over one SQL table.

pub mod error;
pub mod schedule;
pub mod service;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use service::{ScheduleCallback, Scheduler};
pub use store::ScheduleStore;
pub use types::{Schedule, ScheduleKind};
