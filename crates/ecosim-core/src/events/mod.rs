//! Event Output
//!
//! Event queue and JSONL sink for the analytics stream.

pub mod logger;

pub use logger::{EventLogger, EventQueue};
