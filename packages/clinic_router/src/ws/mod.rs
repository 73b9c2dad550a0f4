//! WebSocket transport
//!
//! One connection per participant (doctor, admin desk, patient, guest or CRUD
//! client). Every frame is a JSON envelope tagged by `type`.

mod handler;
mod protocol;

pub use handler::handle_connection;
pub use protocol::{
    ADMIN_ID, BotMessage, ClientMessage, EventSender, ParticipantId, ServerMessage, WaitingEntry,
};
