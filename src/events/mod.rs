//! Event Records and the Append-Only Event Log

pub mod log;
pub mod record;

pub use log::EventLog;
pub use record::{EventAction, EventFields, SignedEvent};
