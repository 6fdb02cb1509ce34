//! ECS Components
//!
//! Components for agents and the per-agent social state they carry.

pub mod agent;
pub mod ledger;
pub mod message;
pub mod social;

pub use agent::*;
pub use ledger::*;
pub use message::*;
pub use social::*;
