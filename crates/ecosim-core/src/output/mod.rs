//! Output Generation
//!
//! Aggregate statistics, the snapshot history buffer, exports, and render frames.

pub mod history;
pub mod snapshot;
pub mod stats;

pub use history::*;
pub use snapshot::*;
pub use stats::*;
