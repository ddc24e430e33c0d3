//! Core types for AgentWatch.

mod event;
mod hook;
mod limits;
mod security;
mod summary;
mod usage;
mod workspace;

pub use event::*;
pub use hook::*;
pub use limits::*;
pub use security::*;
pub use summary::*;
pub use usage::*;
pub use workspace::*;
