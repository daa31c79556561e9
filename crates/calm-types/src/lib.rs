//! Shared types for the box breathing session engine.

mod event;
mod session;
mod ws;

pub use event::*;
pub use session::*;
pub use ws::*;
