//! Real-time router: connection registry, sessions, access gate, handoff
//! state machine and event fan-out, all owned by one actor task.

mod actor;
pub mod fanout;
pub mod gate;
pub mod handoff;
pub mod registry;
pub mod session;


pub use actor::{RouterHandle, RouterServices, RouterStats};
pub use registry::ConnectionHandle;
